//! Continuous retraining: when to retrain, whether the candidate model is
//! good enough to replace the deployed one, and the record of every run.

pub mod config;
pub mod controller;
pub mod feedback;
pub mod gate;
pub mod history;
pub mod notifier;
pub mod status;
pub mod trigger;

pub use config::RetrainingConfig;
pub use controller::{RetrainingController, RunOutcome, RunRequest, RunTicket, TrainingBusy};
pub use feedback::{FeedbackEntry, PredictionFeedbackLog};
pub use gate::{decide, DeploymentDecision};
pub use history::{HistoryError, TrainingHistory};
pub use notifier::{ModelUpdateEvent, ModelUpdateNotifier, TracingNotifier};
pub use status::{SkipReason, TrainingPhase, TrainingRun, TrainingStatus};
pub use trigger::{check_trigger, TriggerInputs, TriggerReason};
