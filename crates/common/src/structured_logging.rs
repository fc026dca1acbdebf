use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Структурированная запись лога в JSON формате
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredLogEntry {
    /// Временная метка в ISO 8601 формате
    pub timestamp: String,
    pub level: String,
    /// Целевой модуль/компонент (для журналов сервисов: id сервиса)
    pub target: String,
    pub message: String,
    /// Дополнительные поля события
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ExecutionContext>,
    /// Длительность операции, если событие пришло от OperationTimer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Контекст процесса, добавляемый к каждой записи
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub app_version: String,
    pub hostname: String,
    pub pid: u32,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        let current = std::thread::current();
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            thread_id: format!("{:?}", current.id()),
            thread_name: current.name().map(str::to_string),
        }
    }
}

/// Слой tracing, печатающий события как JSON-строки
pub struct JsonFormatter {
    include_context: bool,
}

impl JsonFormatter {
    pub fn new(include_context: bool) -> Self {
        Self { include_context }
    }

    /// Собрать запись из события (без вывода)
    pub fn entry_for(&self, event: &Event<'_>) -> StructuredLogEntry {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let duration_ms = visitor.fields.get("duration_ms").and_then(|v| v.as_u64());

        StructuredLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            context: self.include_context.then(ExecutionContext::default),
            duration_ms,
        }
    }
}

impl<S> Layer<S> for JsonFormatter
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let entry = self.entry_for(event);
        if let Ok(json) = serde_json::to_string(&entry) {
            let _ = writeln!(io::stdout(), "{}", json);
        }
    }
}

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: HashMap<String, Value>,
}

impl JsonVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.put(field, Value::String(format!("{:?}", value)));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.put(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.put(field, Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }
}

/// Конфигурация логирования (секция `[logging]` конфигурации реестра)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Минимальный уровень: error, warn, info, debug, trace
    pub level: String,
    /// Вывод в JSON формате
    pub json_output: bool,
    /// Цветной вывод (только для non-JSON)
    pub color_output: bool,
    /// Добавлять контекст процесса к JSON записям
    pub include_context: bool,
    pub include_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_output: false,
            color_output: true,
            include_context: true,
            include_line_numbers: cfg!(debug_assertions),
        }
    }
}

impl LoggingConfig {
    /// Разобрать уровень; неизвестное значение - ошибка конфигурации
    pub fn level(&self) -> anyhow::Result<Level> {
        self.level
            .parse::<Level>()
            .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", self.level))
    }
}

/// Инициализировать глобальный subscriber.
///
/// RUST_LOG имеет приоритет над `config.level`. Повторная инициализация
/// в том же процессе возвращает ошибку.
pub fn init_structured_logging(config: LoggingConfig) -> anyhow::Result<()> {
    let level = config.level()?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if config.json_output {
        let subscriber = Registry::default()
            .with(env_filter)
            .with(JsonFormatter::new(config.include_context));
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(config.include_line_numbers)
            .with_ansi(config.color_output)
            .with_span_events(FmtSpan::CLOSE);

        let subscriber = Registry::default().with(env_filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Замер длительности операции с записью итога в лог
pub struct OperationTimer {
    start: Instant,
    operation_name: String,
    fields: HashMap<String, Value>,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation_name: operation_name.into(),
            fields: HashMap::new(),
        }
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Завершить успешно; возвращает длительность
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        tracing::info!(
            operation = %self.operation_name,
            duration_ms = elapsed.as_millis() as u64,
            success = true,
            fields = ?self.fields,
            "Operation completed"
        );
        elapsed
    }

    /// Завершить с учётом результата операции
    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: &Result<T, E>) -> Duration {
        let elapsed = self.start.elapsed();
        match result {
            Ok(_) => {
                tracing::info!(
                    operation = %self.operation_name,
                    duration_ms = elapsed.as_millis() as u64,
                    success = true,
                    fields = ?self.fields,
                    "Operation completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    operation = %self.operation_name,
                    duration_ms = elapsed.as_millis() as u64,
                    success = false,
                    error = %e,
                    fields = ?self.fields,
                    "Operation failed"
                );
            }
        }
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_serialization_flattens_fields() {
        let mut fields = HashMap::new();
        fields.insert("service_id".to_string(), Value::String("hivemind.test.Adder".to_string()));

        let entry = StructuredLogEntry {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            level: "DEBUG".to_string(),
            target: "hivemind.test.Adder".to_string(),
            message: "BEGIN add(4, 7)".to_string(),
            fields,
            context: Some(ExecutionContext::default()),
            duration_ms: None,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["service_id"], "hivemind.test.Adder");
        assert_eq!(json["message"], "BEGIN add(4, 7)");
        assert!(json.get("duration_ms").is_none());
        assert!(json["context"]["pid"].is_number());
    }

    #[test]
    fn test_logging_config_level_parsing() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            ..Default::default()
        };
        assert_eq!(config.level().unwrap(), Level::DEBUG);

        let bad = LoggingConfig {
            level: "chatty".to_string(),
            ..Default::default()
        };
        assert!(bad.level().is_err());
    }

    #[test]
    fn test_operation_timer_reports_elapsed() {
        let mut timer = OperationTimer::new("registry.startup");
        timer.add_field("eager_services", 3);
        std::thread::sleep(Duration::from_millis(5));

        let result: Result<(), String> = Err("boom".to_string());
        let elapsed = timer.finish_with_result(&result);
        assert!(elapsed >= Duration::from_millis(5));
    }
}
