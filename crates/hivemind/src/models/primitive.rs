use std::sync::{Arc, Weak};

use super::{upgrade, ServiceModel, PRIMITIVE};
use crate::errors::HiveError;
use crate::runtime::ServicePointImpl;
use crate::ServiceRef;

/// Новая реализация (с перехватчиками) при каждом запросе, без прокси
pub struct PrimitiveServiceModel {
    point: Weak<ServicePointImpl>,
}

impl PrimitiveServiceModel {
    pub fn new(point: &Arc<ServicePointImpl>) -> Self {
        Self {
            point: Arc::downgrade(point),
        }
    }
}

impl ServiceModel for PrimitiveServiceModel {
    fn name(&self) -> &str {
        PRIMITIVE
    }

    fn get_service(&self) -> Result<ServiceRef, HiveError> {
        let point = upgrade(&self.point)?;
        Ok(point.construct_service_implementation()?.service)
    }

    fn is_cacheable(&self) -> bool {
        false
    }
}
