//! Ворота построения: single-flight и обнаружение рекурсии
//!
//! Состояния NOT_STARTED -> IN_PROGRESS -> COMPLETE. Повторный вход тем же
//! потоком во время построения - `RecursiveConstruction`; другие потоки ждут
//! завершения текущей попытки. Неудачная попытка возвращает ворота в NOT_STARTED.

use std::collections::HashSet;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::errors::HiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionState {
    NotStarted,
    InProgress,
    Complete,
}

enum Slot<T> {
    Empty,
    Building(ThreadId),
    Ready(T),
}

enum Decision<T> {
    Ready(T),
    Recursive,
    Wait,
    Build,
}

pub struct ConstructionGate<T: Clone> {
    service_id: String,
    slot: Mutex<Slot<T>>,
    changed: Condvar,
}

impl<T: Clone> ConstructionGate<T> {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            slot: Mutex::new(Slot::Empty),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> ConstructionState {
        match &*self.slot.lock() {
            Slot::Empty => ConstructionState::NotStarted,
            Slot::Building(_) => ConstructionState::InProgress,
            Slot::Ready(_) => ConstructionState::Complete,
        }
    }

    /// Готовое значение без попытки построения
    pub fn get(&self) -> Option<T> {
        match &*self.slot.lock() {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Вернуть готовое значение или построить его ровно один раз
    pub fn get_or_try_init<F>(&self, build: F) -> Result<T, HiveError>
    where
        F: FnOnce() -> Result<T, HiveError>,
    {
        let me = thread::current().id();
        {
            let mut slot = self.slot.lock();
            loop {
                let decision = match &*slot {
                    Slot::Ready(value) => Decision::Ready(value.clone()),
                    Slot::Building(owner) if *owner == me => Decision::Recursive,
                    Slot::Building(_) => Decision::Wait,
                    Slot::Empty => Decision::Build,
                };
                match decision {
                    Decision::Ready(value) => return Ok(value),
                    Decision::Recursive => {
                        return Err(HiveError::RecursiveConstruction {
                            service_id: self.service_id.clone(),
                        })
                    }
                    Decision::Wait => self.changed.wait(&mut slot),
                    Decision::Build => {
                        *slot = Slot::Building(me);
                        break;
                    }
                }
            }
        }

        let mut guard = UnwindGuard { gate: self, armed: true };
        let result = build();
        guard.armed = false;

        {
            let mut slot = self.slot.lock();
            *slot = match &result {
                Ok(value) => Slot::Ready(value.clone()),
                Err(_) => Slot::Empty,
            };
        }
        self.changed.notify_all();
        result
    }

    /// Сбросить готовое значение (после shutdown); возвращает прежнее
    pub fn reset(&self) -> Option<T> {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Ready(value) => Some(value),
            Slot::Building(owner) => {
                *slot = Slot::Building(owner);
                None
            }
            Slot::Empty => None,
        }
    }
}

/// Паника внутри построения не должна оставить ворота закрытыми навсегда
struct UnwindGuard<'a, T: Clone> {
    gate: &'a ConstructionGate<T>,
    armed: bool,
}

impl<T: Clone> Drop for UnwindGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            *self.gate.slot.lock() = Slot::Empty;
            self.gate.changed.notify_all();
        }
    }
}

/// Обнаружение рекурсии для моделей без кэширования (primitive)
pub struct ReentrancyTracker {
    service_id: String,
    active: Mutex<HashSet<ThreadId>>,
}

impl ReentrancyTracker {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn enter(&self) -> Result<ReentrancyGuard<'_>, HiveError> {
        let me = thread::current().id();
        if !self.active.lock().insert(me) {
            return Err(HiveError::RecursiveConstruction {
                service_id: self.service_id.clone(),
            });
        }
        Ok(ReentrancyGuard { tracker: self, thread: me })
    }
}

pub struct ReentrancyGuard<'a> {
    tracker: &'a ReentrancyTracker,
    thread: ThreadId,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.tracker.active.lock().remove(&self.thread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn test_single_flight_under_contention() {
        let gate = Arc::new(ConstructionGate::<usize>::new("svc"));
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let builds = builds.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    gate.get_or_try_init(|| {
                        thread::sleep(Duration::from_millis(20));
                        Ok(builds.fetch_add(1, Ordering::SeqCst) + 100)
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 100);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(gate.state(), ConstructionState::Complete);
    }

    #[test]
    fn test_recursion_is_detected() {
        let gate = ConstructionGate::<u8>::new("mod.Loop");
        let result = gate.get_or_try_init(|| gate.get_or_try_init(|| Ok(1)));
        match result {
            Err(HiveError::RecursiveConstruction { service_id }) => assert_eq!(service_id, "mod.Loop"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert_eq!(gate.state(), ConstructionState::NotStarted);
    }

    #[test]
    fn test_failure_reverts_and_allows_retry() {
        let gate = ConstructionGate::<u8>::new("svc");
        assert!(gate
            .get_or_try_init(|| Err(HiveError::configuration("first attempt fails", None)))
            .is_err());
        assert_eq!(gate.state(), ConstructionState::NotStarted);
        assert_eq!(gate.get_or_try_init(|| Ok(7)).unwrap(), 7);
        assert_eq!(gate.reset(), Some(7));
        assert!(gate.get().is_none());
    }

    #[test]
    fn test_panic_reopens_gate() {
        let gate = Arc::new(ConstructionGate::<u8>::new("svc"));
        let inner = gate.clone();
        let joined = thread::spawn(move || inner.get_or_try_init(|| panic!("constructor panicked"))).join();
        assert!(joined.is_err());
        assert_eq!(gate.state(), ConstructionState::NotStarted);
    }

    #[test]
    fn test_reentrancy_tracker() {
        let tracker = ReentrancyTracker::new("mod.Primitive");
        let guard = tracker.enter().unwrap();
        assert!(tracker.enter().is_err());
        drop(guard);
        assert!(tracker.enter().is_ok());
    }
}
