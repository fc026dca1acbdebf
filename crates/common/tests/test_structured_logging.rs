use common::{JsonFormatter, LoggingConfig, OperationTimer, StructuredLogEntry};
use capture::Captured;
use std::sync::{Arc, Mutex};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

mod capture {
    use super::*;

    /// Слой, собирающий записи через JsonFormatter вместо печати
    #[derive(Clone, Default)]
    pub struct Captured {
        pub entries: Arc<Mutex<Vec<StructuredLogEntry>>>,
    }

    impl<S> Layer<S> for Captured
    where
        S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let entry = JsonFormatter::new(false).entry_for(event);
            self.entries.lock().expect("capture lock poisoned").push(entry);
        }
    }
}

#[test]
fn test_events_are_converted_to_entries() {
    let captured = Captured::default();
    let subscriber = Registry::default().with(captured.clone());

    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!(target: "hivemind.test.Adder", method = "add", "BEGIN add(4, 7)");
        tracing::warn!(retries = 3u64, healthy = false, "Pool exhausted");
    });

    let entries = captured.entries.lock().unwrap();
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0].target, "hivemind.test.Adder");
    assert_eq!(entries[0].level, "DEBUG");
    assert_eq!(entries[0].message, "BEGIN add(4, 7)");
    assert_eq!(entries[0].fields["method"], "add");
    assert!(entries[0].context.is_none());

    assert_eq!(entries[1].fields["retries"], 3);
    assert_eq!(entries[1].fields["healthy"], false);
}

#[test]
fn test_operation_timer_emits_duration() {
    let captured = Captured::default();
    let subscriber = Registry::default().with(captured.clone());

    tracing::subscriber::with_default(subscriber, || {
        let mut timer = OperationTimer::new("registry.shutdown");
        timer.add_field("listeners", 2);
        timer.finish();
    });

    let entries = captured.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "Operation completed");
    assert_eq!(entries[0].fields["operation"], "registry.shutdown");
    assert!(entries[0].duration_ms.is_some());
}

#[test]
fn test_logging_config_from_json() {
    let config: LoggingConfig = serde_json::from_str(r#"{"level": "warn", "json_output": true}"#).unwrap();
    assert_eq!(config.level().unwrap(), tracing::Level::WARN);
    assert!(config.json_output);
    assert!(config.color_output);
}
