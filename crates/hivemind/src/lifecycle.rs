//! Интерфейсы жизненного цикла, которые реестр распознаёт у реализаций сервисов

use std::sync::Arc;

use classfab::{ClassFactory, FabricationError, InterfaceDescriptor, MethodSignature, ValueType};

/// Реализация получает уведомление при остановке реестра
pub const REGISTRY_SHUTDOWN_LISTENER: &str = "hivemind.RegistryShutdownListener";
pub const REGISTRY_DID_SHUTDOWN: &str = "registryDidShutdown";

/// Реализация pooled-сервиса получает уведомления о выдаче и возврате в пул
pub const POOL_MANAGEABLE: &str = "hivemind.PoolManageable";
pub const ACTIVATE_SERVICE: &str = "activateService";
pub const PASSIVATE_SERVICE: &str = "passivateService";

/// Реализация threaded-сервиса получает уведомление при очистке потока
pub const DISCARDABLE: &str = "hivemind.Discardable";
pub const THREAD_DID_DISCARD_SERVICE: &str = "threadDidDiscardService";

/// Сервис, запускаемый при `Registry::startup()`
pub const RUNNABLE: &str = "hivemind.Runnable";
pub const RUN: &str = "run";

fn void(name: &str) -> MethodSignature {
    MethodSignature::new(name, ValueType::Void, vec![])
}

/// Объявить интерфейсы жизненного цикла в фабрике (идемпотентно)
pub fn declare_lifecycle_interfaces(factory: &ClassFactory) -> Result<Vec<Arc<InterfaceDescriptor>>, FabricationError> {
    let declarations: [(&str, &[&str]); 4] = [
        (REGISTRY_SHUTDOWN_LISTENER, &[REGISTRY_DID_SHUTDOWN]),
        (POOL_MANAGEABLE, &[ACTIVATE_SERVICE, PASSIVATE_SERVICE]),
        (DISCARDABLE, &[THREAD_DID_DISCARD_SERVICE]),
        (RUNNABLE, &[RUN]),
    ];

    declarations
        .iter()
        .map(|(name, methods)| {
            factory.ensure_interface(name, |factory| {
                methods
                    .iter()
                    .fold(factory.new_interface(*name), |builder, method| builder.add_method(void(method)))
                    .finalize()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_is_idempotent() -> anyhow::Result<()> {
        let factory = ClassFactory::new();
        let first = declare_lifecycle_interfaces(&factory)?;
        let second = declare_lifecycle_interfaces(&factory)?;

        assert_eq!(first.len(), 4);
        assert!(first.iter().zip(&second).all(|(a, b)| Arc::ptr_eq(a, b)));
        assert!(factory.require_interface(POOL_MANAGEABLE)?.has_method(PASSIVATE_SERVICE));
        Ok(())
    }
}
