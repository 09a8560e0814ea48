use chrono::Duration;

/// Thresholds for the retraining loop, read from `REC_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrainingConfig {
    pub min_accuracy_improvement: f64,
    /// Largest drop in accuracy or F1 a candidate may show and still deploy.
    pub max_regression: f64,
    pub min_data_size: usize,
    pub performance_degradation_threshold: f64,
    pub retrain_interval_days: i64,
    pub new_records_threshold: usize,
    pub data_months_back: u32,
    pub feedback_window_days: i64,
}

impl Default for RetrainingConfig {
    fn default() -> Self {
        Self {
            min_accuracy_improvement: 0.01,
            max_regression: 0.02,
            min_data_size: 500,
            performance_degradation_threshold: 0.05,
            retrain_interval_days: 7,
            new_records_threshold: 100,
            data_months_back: 6,
            feedback_window_days: 7,
        }
    }
}

impl RetrainingConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_accuracy_improvement: env_parse("REC_MIN_ACCURACY_IMPROVEMENT").unwrap_or(d.min_accuracy_improvement),
            max_regression: env_parse("REC_MAX_REGRESSION").unwrap_or(d.max_regression),
            min_data_size: env_parse("REC_MIN_DATA_SIZE").unwrap_or(d.min_data_size),
            performance_degradation_threshold: env_parse("REC_PERFORMANCE_DEGRADATION_THRESHOLD")
                .unwrap_or(d.performance_degradation_threshold),
            retrain_interval_days: env_parse("REC_RETRAIN_INTERVAL_DAYS").unwrap_or(d.retrain_interval_days),
            new_records_threshold: env_parse("REC_NEW_RECORDS_THRESHOLD").unwrap_or(d.new_records_threshold),
            data_months_back: env_parse("REC_DATA_MONTHS_BACK").unwrap_or(d.data_months_back),
            feedback_window_days: env_parse("REC_FEEDBACK_WINDOW_DAYS").unwrap_or(d.feedback_window_days),
        }
    }

    pub fn retrain_interval(&self) -> Duration {
        Duration::days(self.retrain_interval_days)
    }

    pub fn feedback_window(&self) -> Duration {
        Duration::days(self.feedback_window_days)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
