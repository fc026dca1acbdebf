//! Журналы сервисов
//!
//! Каждый сервис получает именованный журнал (имя = id сервиса). По умолчанию
//! журналы пишут в `tracing`; `RecordingLogFactory` собирает записи в память
//! для тестов, проверяющих последовательность сообщений.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Именованный журнал
pub trait ServiceLog: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self, level: LogLevel) -> bool;

    fn log(&self, level: LogLevel, message: &str);

    fn is_debug_enabled(&self) -> bool {
        self.is_enabled(LogLevel::Debug)
    }

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message)
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message)
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message)
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message)
    }
}

/// Фабрика журналов по имени
pub trait LogFactory: Send + Sync {
    fn get_log(&self, name: &str) -> Arc<dyn ServiceLog>;
}

/// Журналы поверх `tracing`; имя журнала передаётся полем `log`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogFactory;

impl LogFactory for TracingLogFactory {
    fn get_log(&self, name: &str) -> Arc<dyn ServiceLog> {
        Arc::new(TracingLog { name: name.to_string() })
    }
}

#[derive(Debug)]
struct TracingLog {
    name: String,
}

impl ServiceLog for TracingLog {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Trace => tracing::enabled!(tracing::Level::TRACE),
            LogLevel::Debug => tracing::enabled!(tracing::Level::DEBUG),
            LogLevel::Info => tracing::enabled!(tracing::Level::INFO),
            LogLevel::Warn => tracing::enabled!(tracing::Level::WARN),
            LogLevel::Error => tracing::enabled!(tracing::Level::ERROR),
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(log = %self.name, "{}", message),
            LogLevel::Debug => tracing::debug!(log = %self.name, "{}", message),
            LogLevel::Info => tracing::info!(log = %self.name, "{}", message),
            LogLevel::Warn => tracing::warn!(log = %self.name, "{}", message),
            LogLevel::Error => tracing::error!(log = %self.name, "{}", message),
        }
    }
}

/// Запись, собранная RecordingLogFactory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub log_name: String,
    pub level: LogLevel,
    pub message: String,
}

/// Собирает записи всех своих журналов в общий список
#[derive(Clone)]
pub struct RecordingLogFactory {
    threshold: LogLevel,
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RecordingLogFactory {
    pub fn new(threshold: LogLevel) -> Self {
        Self {
            threshold,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Сообщения указанного журнала в порядке записи
    pub fn messages_for(&self, log_name: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.log_name == log_name)
            .map(|e| e.message.clone())
            .collect()
    }

    /// Сколько сообщений (в любом журнале) начинается с префикса
    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.message.starts_with(prefix))
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for RecordingLogFactory {
    fn default() -> Self {
        Self::new(LogLevel::Debug)
    }
}

impl LogFactory for RecordingLogFactory {
    fn get_log(&self, name: &str) -> Arc<dyn ServiceLog> {
        Arc::new(RecordingLog {
            name: name.to_string(),
            threshold: self.threshold,
            entries: self.entries.clone(),
        })
    }
}

struct RecordingLog {
    name: String,
    threshold: LogLevel,
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl ServiceLog for RecordingLog {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.threshold
    }

    fn log(&self, level: LogLevel, message: &str) {
        if self.is_enabled(level) {
            self.entries.lock().push(LogEntry {
                log_name: self.name.clone(),
                level,
                message: message.to_string(),
            });
        }
    }
}
