use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::gate::DeploymentDecision;
use super::trigger::TriggerReason;
use crate::artifact::TrainingMetrics;

/// Retraining state machine: IDLE → COLLECTING → TRAINING → EVALUATING →
/// {DEPLOYED | REJECTED | FAILED} → IDLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingPhase {
    #[default]
    Idle,
    Collecting,
    Training,
    Evaluating,
    Deployed,
    Rejected,
    Failed,
}

impl TrainingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingPhase::Idle => "idle",
            TrainingPhase::Collecting => "collecting",
            TrainingPhase::Training => "training",
            TrainingPhase::Evaluating => "evaluating",
            TrainingPhase::Deployed => "deployed",
            TrainingPhase::Rejected => "rejected",
            TrainingPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingPhase::Deployed | TrainingPhase::Rejected | TrainingPhase::Failed)
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            TrainingPhase::Collecting | TrainingPhase::Training | TrainingPhase::Evaluating
        )
    }
}

/// Why a pass stopped before training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyRunning,
    NotDue,
    InsufficientData { records: usize, required: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyRunning => f.write_str("training already in progress"),
            SkipReason::NotDue => f.write_str("no retraining trigger fired"),
            SkipReason::InsufficientData { records, required } => {
                write!(f, "insufficient data: {records} records, {required} required")
            }
        }
    }
}

/// One retraining attempt, as kept in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub training_id: String,
    pub status: TrainingPhase,
    /// 0.0〜1.0
    pub progress: f64,
    /// Set once the trigger check has run.
    #[serde(default)]
    pub trigger: Option<TriggerReason>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub records: Option<usize>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub metrics: Option<TrainingMetrics>,
    #[serde(default)]
    pub decision: Option<DeploymentDecision>,
    #[serde(default)]
    pub deployed: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Set when the pass stopped before training; such runs end REJECTED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl TrainingRun {
    pub fn started(training_id: impl Into<String>) -> Self {
        Self {
            training_id: training_id.into(),
            status: TrainingPhase::Collecting,
            progress: 0.0,
            trigger: None,
            started_at: Utc::now(),
            completed_at: None,
            records: None,
            model_version: None,
            metrics: None,
            decision: None,
            deployed: false,
            message: None,
            skipped: None,
        }
    }

    pub fn advance(&mut self, status: TrainingPhase, progress: f64) {
        self.status = status;
        self.progress = progress.clamp(0.0, 1.0);
    }

    pub fn finish(&mut self, status: TrainingPhase, message: impl Into<String>) {
        self.status = status;
        self.progress = 1.0;
        self.deployed = status == TrainingPhase::Deployed;
        self.completed_at = Some(Utc::now());
        self.message = Some(message.into());
    }

    /// End a pass that never trained. The existing model is untouched.
    pub fn skip(&mut self, reason: SkipReason) {
        self.finish(TrainingPhase::Rejected, format!("skipped: {reason}"));
        self.skipped = Some(reason);
    }

    /// Label for the runs counter: the terminal status, or `skipped`.
    pub fn outcome_label(&self) -> &'static str {
        if self.skipped.is_some() {
            "skipped"
        } else {
            self.status.as_str()
        }
    }
}

/// Read-only snapshot for pollers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub phase: TrainingPhase,
    /// The run in progress, if any.
    pub current: Option<TrainingRun>,
    /// Most recent run that reached a terminal state.
    pub last: Option<TrainingRun>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&TrainingPhase::Deployed).unwrap(), "\"deployed\"");
        assert_eq!(TrainingPhase::Evaluating.as_str(), "evaluating");
        assert!(TrainingPhase::Failed.is_terminal());
        assert!(!TrainingPhase::Idle.is_running());
    }

    #[test]
    fn finishing_marks_deployment() {
        let mut run = TrainingRun::started("t1");
        run.advance(TrainingPhase::Training, 1.7);
        assert_eq!(run.progress, 1.0);
        run.finish(TrainingPhase::Deployed, "deployed v1");
        assert!(run.deployed);
        assert!(run.completed_at.is_some());
        assert_eq!(run.outcome_label(), "deployed");
    }

    #[test]
    fn skipped_runs_end_rejected_and_round_trip() {
        let mut run = TrainingRun::started("t2");
        run.skip(SkipReason::InsufficientData {
            records: 50,
            required: 500,
        });
        assert_eq!(run.status, TrainingPhase::Rejected);
        assert!(!run.deployed);
        assert_eq!(run.outcome_label(), "skipped");
        assert_eq!(
            run.message.as_deref(),
            Some("skipped: insufficient data: 50 records, 500 required")
        );

        let json = serde_json::to_string(&run).unwrap();
        assert!(json.contains(r#""skipped":{"kind":"insufficient_data","records":50,"required":500}"#));
        let back: TrainingRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }
}
