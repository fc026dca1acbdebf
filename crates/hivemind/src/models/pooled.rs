use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::proxy::{create_deferred_proxy, ServiceSource};
use super::{upgrade, ServiceModel, POOLED};
use crate::errors::{ConstructionPhase, HiveError};
use crate::lifecycle::{ACTIVATE_SERVICE, PASSIVATE_SERVICE, POOL_MANAGEABLE};
use crate::runtime::{BuiltService, ReentrancyTracker, ServicePointImpl};
use crate::ServiceRef;

/// Экземпляры берутся из пула, закрепляются за потоком до очистки потока.
/// Пул не ограничен: при пустом пуле строится новый экземпляр.
pub struct PooledServiceModel {
    point: Weak<ServicePointImpl>,
    state: Arc<PooledState>,
}

struct PooledState {
    self_ref: Weak<PooledState>,
    point: Weak<ServicePointImpl>,
    pool: Mutex<Vec<BuiltService>>,
    active: DashMap<ThreadId, BuiltService>,
    reentrancy: ReentrancyTracker,
}

impl PooledServiceModel {
    pub fn new(point: &Arc<ServicePointImpl>) -> Self {
        let weak_point = Arc::downgrade(point);
        let state = Arc::new_cyclic(|self_ref| PooledState {
            self_ref: self_ref.clone(),
            point: weak_point.clone(),
            pool: Mutex::new(Vec::new()),
            active: DashMap::new(),
            reentrancy: ReentrancyTracker::new(point.id()),
        });
        Self {
            point: weak_point,
            state,
        }
    }

    /// Свободные экземпляры в пуле
    pub fn pool_size(&self) -> usize {
        self.state.pool.lock().len()
    }
}

impl PooledState {
    fn bind_to_current_thread(&self, me: ThreadId) -> Result<ServiceRef, HiveError> {
        let point = upgrade(&self.point)?;
        let _guard = self.reentrancy.enter()?;

        let pooled = self.pool.lock().pop();
        let built = match pooled {
            Some(built) => built,
            None => point.construct_service_implementation()?,
        };

        if built.core.implements(POOL_MANAGEABLE) {
            if let Err(e) = built.core.invoke(ACTIVATE_SERVICE, &[]) {
                point.services().error_log.error(
                    &format!("Unable to activate pooled instance of service {}", point.id()),
                    None,
                    Some(&HiveError::from(e)),
                )?;
            }
        }

        let service = built.service.clone();
        self.active.insert(me, built);

        let state = self.self_ref.clone();
        point.services().thread_events.add_thread_cleanup_listener(Arc::new(move || {
            if let Some(state) = state.upgrade() {
                state.return_to_pool();
            }
        }));

        Ok(service)
    }

    fn return_to_pool(&self) {
        let Some((_, built)) = self.active.remove(&thread::current().id()) else {
            return;
        };

        if built.core.implements(POOL_MANAGEABLE) {
            if let Err(e) = built.core.invoke(PASSIVATE_SERVICE, &[]) {
                // Экземпляр, не сумевший пассивироваться, в пул не возвращается
                if let Ok(point) = upgrade(&self.point) {
                    let _ = point.services().error_log.error(
                        &format!("Unable to passivate pooled instance of service {}", point.id()),
                        None,
                        Some(&HiveError::from(e)),
                    );
                }
                return;
            }
        }

        let mut pool = self.pool.lock();
        pool.push(built);
        debug!("Returned instance to pool ({} available)", pool.len());
    }
}

impl ServiceSource for PooledState {
    fn service(&self) -> Result<ServiceRef, HiveError> {
        let point = upgrade(&self.point)?;
        point.services().shutdown.check()?;

        let me = thread::current().id();
        if let Some(active) = self.active.get(&me) {
            return Ok(active.service.clone());
        }
        self.bind_to_current_thread(me)
    }
}

impl ServiceModel for PooledServiceModel {
    fn name(&self) -> &str {
        POOLED
    }

    fn get_service(&self) -> Result<ServiceRef, HiveError> {
        let point = upgrade(&self.point)?;
        let interface = point.interface()?;
        create_deferred_proxy(point.class_factory(), "PooledProxy", &interface, self.state.clone())
            .map_err(|e| HiveError::construction_failed(point.id(), ConstructionPhase::Proxy, e))
    }

    fn invalidate(&self) {
        self.state.active.clear();
        self.state.pool.lock().clear();
    }
}
