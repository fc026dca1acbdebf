//! События потока: очистка per-thread состояния сервисов

use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use tracing::debug;

pub trait ThreadCleanupListener: Send + Sync {
    fn thread_did_cleanup(&self);
}

impl<F> ThreadCleanupListener for F
where
    F: Fn() + Send + Sync,
{
    fn thread_did_cleanup(&self) {
        self()
    }
}

/// Слушатели регистрируются на текущий поток и срабатывают один раз
#[derive(Clone, Default)]
pub struct ThreadEventNotifier {
    listeners: Arc<DashMap<ThreadId, Vec<Arc<dyn ThreadCleanupListener>>>>,
}

impl ThreadEventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_thread_cleanup_listener(&self, listener: Arc<dyn ThreadCleanupListener>) {
        self.listeners
            .entry(thread::current().id())
            .or_default()
            .push(listener);
    }

    /// Слушатели текущего потока
    pub fn listener_count(&self) -> usize {
        self.listeners
            .get(&thread::current().id())
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Оповестить и забыть слушателей текущего потока; возвращает их число
    pub fn fire_thread_cleanup(&self) -> usize {
        let snapshot = self
            .listeners
            .remove(&thread::current().id())
            .map(|(_, listeners)| listeners)
            .unwrap_or_default();

        for listener in &snapshot {
            listener.thread_did_cleanup();
        }
        if !snapshot.is_empty() {
            debug!("🧹 Thread cleanup notified {} listeners", snapshot.len());
        }
        snapshot.len()
    }
}
