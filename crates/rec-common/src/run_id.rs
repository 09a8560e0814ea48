//! Identifiers for training runs and model versions.
//!
//! The process gets one ULID at first access (`get`), stamped on log events so
//! every run triggered by the same trainer process can be correlated. Each
//! training run gets its own ULID from `generate`.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use ulid::Ulid;

static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Process-level run id, stable for the lifetime of the process.
#[inline]
pub fn get() -> &'static str {
    &RUN_ID
}

/// Fresh ULID for a single training run.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

/// Model version label: UTC training timestamp plus the run's ULID suffix, so
/// versions sort by training time and never collide within one second.
pub fn model_version(trained_at: DateTime<Utc>, training_id: &str) -> String {
    let suffix: String = training_id
        .chars()
        .rev()
        .take(6)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("v{}-{}", trained_at.format("%Y%m%d_%H%M%S"), suffix.to_ascii_lowercase())
}
