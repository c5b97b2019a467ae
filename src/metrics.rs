//! Fire-and-forget metric events.
//!
//! Events have a category, a name and a flat list of string fields. The
//! default sink turns them into `tracing` events on the `metrics` target so a
//! log shipper can pick them up.

use std::sync::{Arc, Mutex};
use tracing::info;

pub const CATEGORY_MFA: &str = "mfa";
pub const CREATE_TOKEN: &str = "createToken";
pub const DELETE_INACTIVE_TOKEN: &str = "deleteInactiveToken";

pub trait MetricSink: Send + Sync {
    fn log_metric(&self, category: &str, name: &str, fields: &[(&str, &str)]);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl MetricSink for TracingMetrics {
    fn log_metric(&self, category: &str, name: &str, fields: &[(&str, &str)]) {
        let fields: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v)))
            .collect();

        info!(
            target: "metrics",
            category = category,
            metric = name,
            fields = %serde_json::Value::Object(fields),
            "metric"
        );
    }
}

/// A metric event as captured by [`RecordingMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricEvent {
    pub category: String,
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl MetricEvent {
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every event in memory; used by tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetrics {
    events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl RecordingMetrics {
    #[must_use]
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn named(&self, name: &str) -> Vec<MetricEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.name == name)
            .collect()
    }
}

impl MetricSink for RecordingMetrics {
    fn log_metric(&self, category: &str, name: &str, fields: &[(&str, &str)]) {
        if let Ok(mut events) = self.events.lock() {
            events.push(MetricEvent {
                category: category.to_string(),
                name: name.to_string(),
                fields: fields
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            });
        }
    }
}
