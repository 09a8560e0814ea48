use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUpdateEvent {
    pub training_id: String,
    pub model_version: String,
    pub previous_version: Option<String>,
    pub deployed_at: DateTime<Utc>,
    pub accuracy: f64,
    pub f1: f64,
}

/// Told about every deployment; downstream consumers (caches, dashboards)
/// hook in here.
pub trait ModelUpdateNotifier: Send + Sync {
    fn model_updated(&self, event: &ModelUpdateEvent);
}

/// Logs the deployment and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl ModelUpdateNotifier for TracingNotifier {
    fn model_updated(&self, event: &ModelUpdateEvent) {
        info!(
            training_id = %event.training_id,
            model_version = %event.model_version,
            previous_version = ?event.previous_version,
            accuracy = event.accuracy,
            f1 = event.f1,
            "model updated"
        );
    }
}
