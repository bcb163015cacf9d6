use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use tracing::{
    Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::Layer;

use crate::models::{ErrorEntry, ErrorLevel, ErrorStore};

/// Visitor to extract fields from tracing events
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: HashMap::new(),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value_str = format!("{:?}", value);

        if field.name() == "message" {
            self.message = Some(value_str);
        } else {
            self.fields.insert(field.name().to_string(), value_str);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }
}

/// Tracing layer that records WARN and ERROR events into an [`ErrorStore`]
pub struct ErrorCollectorLayer {
    store: ErrorStore,
}

impl ErrorCollectorLayer {
    pub fn new(store: ErrorStore) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for ErrorCollectorLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();

        // Only capture WARN and ERROR levels
        if !matches!(*metadata.level(), Level::WARN | Level::ERROR) {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        // The store is bounded, old entries fall off the front
        self.store.add_entry(ErrorEntry {
            timestamp: Utc::now(),
            level: if *metadata.level() == Level::ERROR {
                ErrorLevel::Error
            } else {
                ErrorLevel::Warning
            },
            message: visitor.message.unwrap_or_default(),
            target: metadata.target().to_string(),
            file: metadata.file().map(String::from),
            line: metadata.line(),
            fields: visitor.fields,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn setup_collector(capacity: usize) -> (impl tracing::Subscriber, ErrorStore) {
        let store = ErrorStore::new(capacity);
        let subscriber = tracing_subscriber::registry().with(ErrorCollectorLayer::new(store.clone()));
        (subscriber, store)
    }

    #[test]
    fn test_captures_error_and_warn_events() {
        let (subscriber, store) = setup_collector(10);
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("something failed");
            tracing::warn!("careful now");
        });

        let entries = store.get_all_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, ErrorLevel::Error);
        assert!(entries[0].message.contains("something failed"));
        assert_eq!(entries[1].level, ErrorLevel::Warning);
        assert!(entries[1].message.contains("careful now"));
    }

    #[test]
    fn test_ignores_lower_levels() {
        let (subscriber, store) = setup_collector(10);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("just info");
            tracing::debug!("debug stuff");
            tracing::trace!("trace stuff");
        });

        assert!(store.get_all_entries().is_empty());
    }

    #[test]
    fn test_captures_target_and_fields() {
        let (subscriber, store) = setup_collector(10);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "chatline::persistence", generation = 3, path = "/tmp/x", "save failed");
        });

        let entry = &store.get_all_entries()[0];
        assert_eq!(entry.target, "chatline::persistence");
        assert_eq!(entry.fields.get("generation").map(String::as_str), Some("3"));
        assert!(entry.fields.contains_key("path"));
        assert!(entry.line.is_some());
    }

    #[test]
    fn test_timestamp_is_recent() {
        let before = Utc::now();
        let (subscriber, store) = setup_collector(10);
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("timed event");
        });
        let after = Utc::now();

        let entry = &store.get_all_entries()[0];
        assert!(entry.timestamp >= before && entry.timestamp <= after);
    }

    #[test]
    fn test_overflow_keeps_newest() {
        let (subscriber, store) = setup_collector(2);
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..10 {
                tracing::error!("overflow event {}", i);
            }
        });

        let entries = store.get_all_entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].message.contains("overflow event 9"));
    }
}
