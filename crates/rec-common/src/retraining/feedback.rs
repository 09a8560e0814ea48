use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Outcome of one served recommendation, reported after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub recorded_at: DateTime<Utc>,
    pub task_id: String,
    pub candidate_id: String,
    pub predicted_success: bool,
    pub actual_success: bool,
}

/// Rolling window of prediction feedback used to detect degradation.
#[derive(Debug)]
pub struct PredictionFeedbackLog {
    window: Duration,
    entries: Mutex<Vec<FeedbackEntry>>,
}

impl PredictionFeedbackLog {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, entry: FeedbackEntry) {
        let mut entries = self.entries.lock();
        let cutoff = entry.recorded_at - self.window;
        entries.retain(|e| e.recorded_at >= cutoff);
        entries.push(entry);
    }

    /// Share of correct predictions within the window ending at `now`;
    /// `None` without any feedback in the window.
    pub fn rolling_accuracy(&self, now: DateTime<Utc>) -> Option<f64> {
        let cutoff = now - self.window;
        let entries = self.entries.lock();
        let (correct, total) = entries
            .iter()
            .filter(|e| e.recorded_at >= cutoff && e.recorded_at <= now)
            .fold((0usize, 0usize), |(correct, total), e| {
                (correct + usize::from(e.predicted_success == e.actual_success), total + 1)
            });
        (total > 0).then(|| correct as f64 / total as f64)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for PredictionFeedbackLog {
    fn default() -> Self {
        Self::new(Duration::days(7))
    }
}
