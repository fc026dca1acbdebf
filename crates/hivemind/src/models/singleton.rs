use std::sync::{Arc, Weak};

use super::proxy::{create_deferred_proxy, ServiceSource};
use super::{upgrade, ServiceModel, SINGLETON};
use crate::errors::{ConstructionPhase, HiveError};
use crate::lifecycle::REGISTRY_SHUTDOWN_LISTENER;
use crate::runtime::{ConstructionGate, ServiceObjectShutdownListener, ServicePointImpl};
use crate::ServiceRef;

/// Один экземпляр на реестр; реализация строится при первом вызове метода
pub struct SingletonServiceModel {
    point: Weak<ServicePointImpl>,
    core: Arc<SingletonCore>,
}

struct SingletonCore {
    point: Weak<ServicePointImpl>,
    gate: ConstructionGate<ServiceRef>,
}

impl SingletonServiceModel {
    pub fn new(point: &Arc<ServicePointImpl>) -> Self {
        Self {
            point: Arc::downgrade(point),
            core: Arc::new(SingletonCore {
                point: Arc::downgrade(point),
                gate: ConstructionGate::new(point.id()),
            }),
        }
    }
}

impl ServiceSource for SingletonCore {
    fn service(&self) -> Result<ServiceRef, HiveError> {
        let point = upgrade(&self.point)?;
        point.services().shutdown.check()?;

        self.gate.get_or_try_init(|| {
            let built = point.construct_service_implementation()?;
            if built.core.implements(REGISTRY_SHUTDOWN_LISTENER) {
                point
                    .services()
                    .shutdown
                    .add_listener(Arc::new(ServiceObjectShutdownListener::new(point.id(), built.core.clone())))?;
            }
            Ok(built.service)
        })
    }
}

impl ServiceModel for SingletonServiceModel {
    fn name(&self) -> &str {
        SINGLETON
    }

    fn get_service(&self) -> Result<ServiceRef, HiveError> {
        let point = upgrade(&self.point)?;
        point
            .log()
            .debug(&format!("Creating SingletonProxy for service {}", point.id()));

        let interface = point.interface()?;
        create_deferred_proxy(
            point.class_factory(),
            "SingletonProxy",
            &interface,
            self.core.clone(),
        )
        .map_err(|e| HiveError::construction_failed(point.id(), ConstructionPhase::Proxy, e))
    }

    fn is_realizable(&self) -> bool {
        true
    }

    fn instantiate_service(&self) -> Result<(), HiveError> {
        self.core.service().map(|_| ())
    }

    fn invalidate(&self) {
        self.core.gate.reset();
    }
}
