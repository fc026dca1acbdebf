use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use dashmap::DashMap;

use super::proxy::{create_deferred_proxy, ServiceSource};
use super::{upgrade, ServiceModel, THREADED};
use crate::errors::{ConstructionPhase, HiveError};
use crate::lifecycle::{DISCARDABLE, REGISTRY_SHUTDOWN_LISTENER, THREAD_DID_DISCARD_SERVICE};
use crate::runtime::{BuiltService, ReentrancyTracker, ServicePointImpl};
use crate::ServiceRef;

/// Отдельная реализация для каждого потока за общим прокси
pub struct ThreadedServiceModel {
    point: Weak<ServicePointImpl>,
    state: Arc<ThreadedState>,
}

struct ThreadedState {
    self_ref: Weak<ThreadedState>,
    point: Weak<ServicePointImpl>,
    slots: DashMap<ThreadId, BuiltService>,
    reentrancy: ReentrancyTracker,
    warned: AtomicBool,
}

impl ThreadedServiceModel {
    pub fn new(point: &Arc<ServicePointImpl>) -> Self {
        let weak_point = Arc::downgrade(point);
        let state = Arc::new_cyclic(|self_ref| ThreadedState {
            self_ref: self_ref.clone(),
            point: weak_point.clone(),
            slots: DashMap::new(),
            reentrancy: ReentrancyTracker::new(point.id()),
            warned: AtomicBool::new(false),
        });
        Self {
            point: weak_point,
            state,
        }
    }

    /// Сколько потоков сейчас держат свою реализацию
    pub fn active_threads(&self) -> usize {
        self.state.slots.len()
    }
}

impl ThreadedState {
    fn build_for_current_thread(&self, me: ThreadId) -> Result<ServiceRef, HiveError> {
        let point = upgrade(&self.point)?;
        let _guard = self.reentrancy.enter()?;
        let built = point.construct_service_implementation()?;

        if built.core.implements(REGISTRY_SHUTDOWN_LISTENER) && !self.warned.swap(true, Ordering::Relaxed) {
            point.log().warn(&format!(
                "Service {} implements {} but uses the threaded service model; it will not be notified of registry shutdown",
                point.id(),
                REGISTRY_SHUTDOWN_LISTENER
            ));
        }

        let service = built.service.clone();
        self.slots.insert(me, built);

        let state = self.self_ref.clone();
        point.services().thread_events.add_thread_cleanup_listener(Arc::new(move || {
            if let Some(state) = state.upgrade() {
                state.discard_current_thread();
            }
        }));

        Ok(service)
    }

    fn discard_current_thread(&self) {
        let Some((_, built)) = self.slots.remove(&thread::current().id()) else {
            return;
        };
        if !built.core.implements(DISCARDABLE) {
            return;
        }
        if let Err(e) = built.core.invoke(THREAD_DID_DISCARD_SERVICE, &[]) {
            if let Ok(point) = upgrade(&self.point) {
                let cause = HiveError::from(e);
                let _ = point.services().error_log.error(
                    &format!("Error discarding thread-local instance of service {}", point.id()),
                    None,
                    Some(&cause),
                );
            }
        }
    }
}

impl ServiceSource for ThreadedState {
    fn service(&self) -> Result<ServiceRef, HiveError> {
        let point = upgrade(&self.point)?;
        point.services().shutdown.check()?;

        let me = thread::current().id();
        if let Some(slot) = self.slots.get(&me) {
            return Ok(slot.service.clone());
        }
        self.build_for_current_thread(me)
    }
}

impl ServiceModel for ThreadedServiceModel {
    fn name(&self) -> &str {
        THREADED
    }

    fn get_service(&self) -> Result<ServiceRef, HiveError> {
        let point = upgrade(&self.point)?;
        let interface = point.interface()?;
        create_deferred_proxy(point.class_factory(), "ThreadedProxy", &interface, self.state.clone())
            .map_err(|e| HiveError::construction_failed(point.id(), ConstructionPhase::Proxy, e))
    }

    fn invalidate(&self) {
        self.state.slots.clear();
    }
}
