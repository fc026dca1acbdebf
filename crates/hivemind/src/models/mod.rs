//! Модели сервисов: когда и сколько раз строится реализация
//!
//! - `singleton`: один экземпляр, строится при первом вызове метода прокси
//! - `primitive`: построение при каждом `get_service()`, без прокси
//! - `threaded`: экземпляр на поток, удаляется при очистке потока
//! - `pooled`: экземпляр из пула на поток, возвращается в пул при очистке

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crate::errors::HiveError;
use crate::runtime::ServicePointImpl;
use crate::ServiceRef;

mod pooled;
mod primitive;
mod proxy;
mod singleton;
mod threaded;

pub use pooled::PooledServiceModel;
pub use primitive::PrimitiveServiceModel;
pub use proxy::{create_deferred_proxy, ServiceSource};
pub use singleton::SingletonServiceModel;
pub use threaded::ThreadedServiceModel;

pub const SINGLETON: &str = "singleton";
pub const PRIMITIVE: &str = "primitive";
pub const THREADED: &str = "threaded";
pub const POOLED: &str = "pooled";

pub trait ServiceModel: Send + Sync {
    fn name(&self) -> &str;

    /// Объект сервиса согласно политике модели
    fn get_service(&self) -> Result<ServiceRef, HiveError>;

    /// Можно ли кэшировать результат `get_service()` в точке сервиса
    fn is_cacheable(&self) -> bool {
        true
    }

    /// Поддерживает ли модель eager load
    fn is_realizable(&self) -> bool {
        false
    }

    /// Построить реализацию немедленно (eager load)
    fn instantiate_service(&self) -> Result<(), HiveError> {
        Ok(())
    }

    /// Забыть все построенные экземпляры (shutdown)
    fn invalidate(&self) {}
}

pub trait ServiceModelFactory: Send + Sync {
    fn create_service_model(&self, point: &Arc<ServicePointImpl>) -> Result<Arc<dyn ServiceModel>, HiveError>;
}

impl<F> ServiceModelFactory for F
where
    F: Fn(&Arc<ServicePointImpl>) -> Result<Arc<dyn ServiceModel>, HiveError> + Send + Sync,
{
    fn create_service_model(&self, point: &Arc<ServicePointImpl>) -> Result<Arc<dyn ServiceModel>, HiveError> {
        self(point)
    }
}

/// Встроенные модели по имени
pub fn builtin_service_models() -> BTreeMap<String, Arc<dyn ServiceModelFactory>> {
    let mut models: BTreeMap<String, Arc<dyn ServiceModelFactory>> = BTreeMap::new();
    models.insert(
        SINGLETON.to_string(),
        Arc::new(|point: &Arc<ServicePointImpl>| -> Result<Arc<dyn ServiceModel>, HiveError> {
            Ok(Arc::new(SingletonServiceModel::new(point)))
        }),
    );
    models.insert(
        PRIMITIVE.to_string(),
        Arc::new(|point: &Arc<ServicePointImpl>| -> Result<Arc<dyn ServiceModel>, HiveError> {
            Ok(Arc::new(PrimitiveServiceModel::new(point)))
        }),
    );
    models.insert(
        THREADED.to_string(),
        Arc::new(|point: &Arc<ServicePointImpl>| -> Result<Arc<dyn ServiceModel>, HiveError> {
            Ok(Arc::new(ThreadedServiceModel::new(point)))
        }),
    );
    models.insert(
        POOLED.to_string(),
        Arc::new(|point: &Arc<ServicePointImpl>| -> Result<Arc<dyn ServiceModel>, HiveError> {
            Ok(Arc::new(PooledServiceModel::new(point)))
        }),
    );
    models
}

/// Точка сервиса принадлежит реестру; модели держат только слабую ссылку
fn upgrade(point: &Weak<ServicePointImpl>) -> Result<Arc<ServicePointImpl>, HiveError> {
    point.upgrade().ok_or(HiveError::RegistryShutdown)
}
