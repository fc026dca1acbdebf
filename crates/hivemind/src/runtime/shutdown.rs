//! Координатор остановки реестра

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::errors::HiveError;
use crate::lifecycle::REGISTRY_DID_SHUTDOWN;
use crate::ServiceRef;

/// Получатель уведомления об остановке реестра
pub trait RegistryShutdownListener: Send + Sync {
    fn registry_did_shutdown(&self) -> Result<(), HiveError>;
}

impl<F> RegistryShutdownListener for F
where
    F: Fn() -> Result<(), HiveError> + Send + Sync,
{
    fn registry_did_shutdown(&self) -> Result<(), HiveError> {
        self()
    }
}

/// Реализация сервиса, объявившая `hivemind.RegistryShutdownListener`
pub struct ServiceObjectShutdownListener {
    service_id: String,
    object: ServiceRef,
}

impl ServiceObjectShutdownListener {
    pub fn new(service_id: impl Into<String>, object: ServiceRef) -> Self {
        Self {
            service_id: service_id.into(),
            object,
        }
    }
}

impl RegistryShutdownListener for ServiceObjectShutdownListener {
    fn registry_did_shutdown(&self) -> Result<(), HiveError> {
        debug!("Notifying {} of registry shutdown", self.service_id);
        self.object.invoke(REGISTRY_DID_SHUTDOWN, &[])?;
        Ok(())
    }
}

struct ShutdownState {
    /// Остановка начата; повторный `shutdown()` отклоняется
    shutting_down: AtomicBool,
    /// Слушатели отработали; с этого момента `check()` отказывает.
    /// Выставляется только под блокировкой `listeners`.
    shut_down: AtomicBool,
    listeners: Mutex<Vec<Arc<dyn RegistryShutdownListener>>>,
}

/// Однократная остановка: после оповещения слушателей каждая операция
/// получает RegistryShutdown
#[derive(Clone)]
pub struct ShutdownCoordinator {
    state: Arc<ShutdownState>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ShutdownState {
                shutting_down: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.shut_down.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<(), HiveError> {
        if self.is_shut_down() {
            Err(HiveError::RegistryShutdown)
        } else {
            Ok(())
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn RegistryShutdownListener>) -> Result<(), HiveError> {
        let mut listeners = self.state.listeners.lock();
        self.check()?;
        listeners.push(listener);
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.state.listeners.lock().len()
    }

    /// Оповестить слушателей по очереди; сбой одного не мешает остальным.
    /// Пока слушатели работают, реестр остаётся доступным: слушатель может
    /// обратиться к другому сервису, а слушатель, зарегистрированный в это
    /// время, тоже будет оповещён. Возвращает число слушателей с ошибкой.
    pub fn shutdown(&self) -> Result<usize, HiveError> {
        if self.state.shutting_down.swap(true, Ordering::AcqRel) {
            return Err(HiveError::RegistryShutdown);
        }

        let mut notified = 0;
        let mut failures = 0;
        loop {
            let batch: Vec<_> = {
                let mut listeners = self.state.listeners.lock();
                if listeners.is_empty() {
                    self.state.shut_down.store(true, Ordering::Release);
                    break;
                }
                std::mem::take(&mut *listeners)
            };

            notified += batch.len();
            for listener in batch {
                match catch_unwind(AssertUnwindSafe(|| listener.registry_did_shutdown())) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        failures += 1;
                        error!("Shutdown listener failed: {}", e);
                    }
                    Err(_) => {
                        failures += 1;
                        error!("Shutdown listener panicked");
                    }
                }
            }
        }

        info!("🛑 Registry shutdown: notified {} listeners", notified);
        Ok(failures)
    }
}
