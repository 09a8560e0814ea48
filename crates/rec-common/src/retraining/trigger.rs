use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::RetrainingConfig;

/// Why a run was started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerReason {
    FirstTraining,
    Forced,
    Synthetic,
    IntervalElapsed { days: i64 },
    NewRecords { count: usize },
    PerformanceDegradation { baseline: f64, current: f64 },
}

/// What the trigger check looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerInputs {
    pub last_training: Option<DateTime<Utc>>,
    pub new_records: usize,
    /// Accuracy of the deployed model at deploy time.
    pub baseline_accuracy: Option<f64>,
    /// Accuracy observed on recent prediction feedback.
    pub rolling_accuracy: Option<f64>,
}

/// First matching condition in order: no prior training, interval elapsed,
/// enough new records, accuracy degradation.
pub fn check_trigger(inputs: &TriggerInputs, config: &RetrainingConfig, now: DateTime<Utc>) -> Option<TriggerReason> {
    let Some(last) = inputs.last_training else {
        return Some(TriggerReason::FirstTraining);
    };

    let elapsed = now - last;
    if elapsed >= config.retrain_interval() {
        return Some(TriggerReason::IntervalElapsed {
            days: elapsed.num_days(),
        });
    }

    if inputs.new_records >= config.new_records_threshold {
        return Some(TriggerReason::NewRecords {
            count: inputs.new_records,
        });
    }

    if let (Some(baseline), Some(current)) = (inputs.baseline_accuracy, inputs.rolling_accuracy) {
        if baseline - current >= config.performance_degradation_threshold {
            return Some(TriggerReason::PerformanceDegradation { baseline, current });
        }
    }

    None
}
