use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::config::RetrainingConfig;
use super::feedback::PredictionFeedbackLog;
use super::gate::decide;
use super::history::TrainingHistory;
use super::notifier::{ModelUpdateEvent, ModelUpdateNotifier, TracingNotifier};
use super::status::{SkipReason, TrainingPhase, TrainingRun, TrainingStatus};
use super::trigger::{check_trigger, TriggerInputs, TriggerReason};
use crate::artifact::{ActiveModel, ArtifactError, ArtifactStore, ModelArtifact};
use crate::data_source::{DataSourceError, TrainingDataSource};
use crate::logging::panic_message;
use crate::run_id;
use crate::synthetic::SyntheticDataGenerator;
use crate::trainer::{EvaluationReport, HybridTrainer, TrainingError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Skip the trigger check. The data guard and the deployment gate still apply.
    pub force: bool,
    /// Train on generated data instead of the configured source.
    pub synthetic: bool,
    pub months_back: Option<u32>,
}

/// `Skipped` passes never claimed a training id and leave no trace in the
/// ledger. A pass that claimed one always finishes with a terminal run, even
/// when it stopped before training (`TrainingRun::skipped`).
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Finished(TrainingRun),
}

#[derive(Debug, Error)]
#[error("training already in progress")]
pub struct TrainingBusy;

/// Stage failures inside one run; they end the run as FAILED.
#[derive(Debug, Error)]
enum RunError {
    #[error("data collection failed: {0}")]
    DataSource(#[from] DataSourceError),
    #[error("training failed: {0}")]
    Training(#[from] TrainingError),
    #[error("deployment failed: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Exclusive right to run one training pass. Dropping it returns the
/// controller to IDLE.
pub struct RunTicket {
    controller: Arc<RetrainingController>,
    training_id: String,
}

impl RunTicket {
    pub fn training_id(&self) -> &str {
        &self.training_id
    }

    pub fn run(self, request: RunRequest) -> RunOutcome {
        self.controller.execute(&self.training_id, request)
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        {
            let mut status = self.controller.status.write();
            status.phase = TrainingPhase::Idle;
            status.current = None;
        }
        self.controller.running.store(false, Ordering::Release);
    }
}

pub struct RetrainingController {
    config: RetrainingConfig,
    trainer: HybridTrainer,
    source: Arc<dyn TrainingDataSource>,
    synthetic: Arc<dyn TrainingDataSource>,
    store: ArtifactStore,
    active: Arc<ActiveModel>,
    history: Arc<TrainingHistory>,
    feedback: Arc<PredictionFeedbackLog>,
    notifier: Arc<dyn ModelUpdateNotifier>,
    running: AtomicBool,
    status: RwLock<TrainingStatus>,
    last_evaluation: RwLock<Option<EvaluationReport>>,
}

impl RetrainingController {
    pub fn new(
        config: RetrainingConfig,
        trainer: HybridTrainer,
        source: Arc<dyn TrainingDataSource>,
        store: ArtifactStore,
        active: Arc<ActiveModel>,
    ) -> Self {
        let feedback = Arc::new(PredictionFeedbackLog::new(config.feedback_window()));
        Self {
            config,
            trainer,
            source,
            synthetic: Arc::new(SyntheticDataGenerator::default()),
            store,
            active,
            history: Arc::new(TrainingHistory::in_memory()),
            feedback,
            notifier: Arc::new(TracingNotifier),
            running: AtomicBool::new(false),
            status: RwLock::new(TrainingStatus::default()),
            last_evaluation: RwLock::new(None),
        }
    }

    pub fn with_history(mut self, history: Arc<TrainingHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ModelUpdateNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_synthetic_source(mut self, synthetic: Arc<dyn TrainingDataSource>) -> Self {
        self.synthetic = synthetic;
        self
    }

    pub fn config(&self) -> &RetrainingConfig {
        &self.config
    }

    pub fn active(&self) -> &Arc<ActiveModel> {
        &self.active
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn history(&self) -> &Arc<TrainingHistory> {
        &self.history
    }

    pub fn feedback(&self) -> &Arc<PredictionFeedbackLog> {
        &self.feedback
    }

    pub fn status(&self) -> TrainingStatus {
        self.status.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn last_evaluation(&self) -> Option<EvaluationReport> {
        self.last_evaluation.read().clone()
    }

    /// Claim the single training slot. A second caller gets `TrainingBusy`
    /// until the first ticket is dropped.
    pub fn try_start(self: &Arc<Self>, training_id: impl Into<String>) -> Result<RunTicket, TrainingBusy> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TrainingBusy)?;
        let training_id = training_id.into();
        self.publish(&TrainingRun::started(training_id.clone()));
        Ok(RunTicket {
            controller: Arc::clone(self),
            training_id,
        })
    }

    /// One pass with a fresh training id; used by the scheduler. Unforced
    /// passes check the trigger before claiming an id, so idle ticks are not
    /// written to the ledger.
    pub fn run_once(self: &Arc<Self>, request: RunRequest) -> RunOutcome {
        if !request.force && !request.synthetic && !self.is_running() {
            match self.due(self.source.as_ref()) {
                Ok(None) => {
                    debug!("retraining not due");
                    return RunOutcome::Skipped(SkipReason::NotDue);
                }
                Ok(Some(_)) => {}
                // the pass itself records the failure
                Err(err) => debug!(error = %err, "trigger check failed before claiming a run"),
            }
        }
        match self.try_start(run_id::generate()) {
            Ok(ticket) => ticket.run(request),
            Err(TrainingBusy) => {
                warn!("retraining skipped: training already in progress");
                RunOutcome::Skipped(SkipReason::AlreadyRunning)
            }
        }
    }

    #[instrument(skip_all, fields(training_id = %training_id))]
    fn execute(&self, training_id: &str, request: RunRequest) -> RunOutcome {
        let mut run = TrainingRun::started(training_id);
        self.publish(&run);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.pipeline(&mut run, request)));
        match result {
            Ok(Ok(Some(skip))) => {
                info!(reason = %skip, "retraining skipped");
                run.skip(skip);
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => {
                error!(error = %err, phase = run.status.as_str(), "retraining failed");
                run.finish(TrainingPhase::Failed, err.to_string());
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(error = %message, phase = run.status.as_str(), "retraining panicked");
                run.finish(TrainingPhase::Failed, message);
            }
        }

        metrics::counter!("rec_training_runs_total", "status" => run.outcome_label()).increment(1);
        if let Err(err) = self.history.append(run.clone()) {
            error!(error = %err, "failed to append training run to the ledger");
        }
        {
            let mut status = self.status.write();
            status.phase = run.status;
            status.current = None;
            status.last = Some(run.clone());
        }
        RunOutcome::Finished(run)
    }

    /// `Ok(Some(_))` when the pass stops before training; `Ok(None)` once the
    /// run reached DEPLOYED or REJECTED.
    fn pipeline(&self, run: &mut TrainingRun, request: RunRequest) -> Result<Option<SkipReason>, RunError> {
        let source: &dyn TrainingDataSource = if request.synthetic {
            self.synthetic.as_ref()
        } else {
            self.source.as_ref()
        };

        let trigger = if request.synthetic {
            TriggerReason::Synthetic
        } else if request.force {
            TriggerReason::Forced
        } else {
            match self.due(source)? {
                Some(trigger) => trigger,
                None => return Ok(Some(SkipReason::NotDue)),
            }
        };
        info!(trigger = ?trigger, source = source.name(), "retraining started");
        run.trigger = Some(trigger);

        let months_back = request.months_back.unwrap_or(self.config.data_months_back);
        let records = source.collect(months_back)?;
        if records.len() < self.config.min_data_size {
            warn!(
                records = records.len(),
                required = self.config.min_data_size,
                "not enough data to retrain"
            );
            return Ok(Some(SkipReason::InsufficientData {
                records: records.len(),
                required: self.config.min_data_size,
            }));
        }
        run.records = Some(records.len());

        self.advance(run, TrainingPhase::Training, 0.3);
        let outcome = self.trainer.train(&records, &run.training_id)?;

        self.advance(run, TrainingPhase::Evaluating, 0.8);
        let current = self.active.get();
        let candidate_metrics = outcome.metrics().clone();
        let decision = decide(
            current.as_ref().map(|a| &a.metadata.training_metrics.hybrid),
            &candidate_metrics.hybrid,
            &self.config,
        );
        run.model_version = Some(outcome.artifact.version().to_string());
        run.metrics = Some(candidate_metrics);
        run.decision = Some(decision.clone());
        *self.last_evaluation.write() = Some(outcome.evaluation);

        if !decision.deploy {
            info!(reason = %decision.reason, "candidate model rejected");
            run.finish(TrainingPhase::Rejected, decision.reason);
            return Ok(None);
        }

        let version = self.deploy(outcome.artifact, &run.training_id)?;
        run.finish(TrainingPhase::Deployed, format!("deployed {version}: {}", decision.reason));
        Ok(None)
    }

    /// Persist, point `ACTIVE` at it, then swap the in-memory model.
    fn deploy(&self, artifact: ModelArtifact, training_id: &str) -> Result<String, ArtifactError> {
        let version = artifact.version().to_string();
        self.store.save(&artifact)?;
        self.store.activate(&version)?;

        let hybrid = artifact.metadata.training_metrics.hybrid.clone();
        let previous = self.active.swap(Arc::new(artifact));
        metrics::gauge!("rec_active_model_f1").set(hybrid.f1);
        info!(model_version = %version, f1 = hybrid.f1, accuracy = hybrid.accuracy, "model deployed");

        let event = ModelUpdateEvent {
            training_id: training_id.to_string(),
            model_version: version.clone(),
            previous_version: previous.map(|p| p.version().to_string()),
            deployed_at: Utc::now(),
            accuracy: hybrid.accuracy,
            f1: hybrid.f1,
        };
        // The model is live at this point; a broken notifier cannot undo that.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.notifier.model_updated(&event))) {
            warn!(
                error = %panic_message(payload.as_ref()),
                model_version = %version,
                "model update notifier panicked"
            );
        }
        Ok(version)
    }

    fn due(&self, source: &dyn TrainingDataSource) -> Result<Option<TriggerReason>, DataSourceError> {
        let active = self.active.get();
        let last_training = self
            .history
            .last_training_at()
            .or_else(|| active.as_ref().map(|a| a.metadata.training_date));
        let new_records = match last_training {
            Some(since) => source.count_records_since(since)?,
            None => 0,
        };
        let now = Utc::now();
        let inputs = TriggerInputs {
            last_training,
            new_records,
            baseline_accuracy: active.as_ref().map(|a| a.metadata.training_metrics.hybrid.accuracy),
            rolling_accuracy: self.feedback.rolling_accuracy(now),
        };
        Ok(check_trigger(&inputs, &self.config, now))
    }

    fn advance(&self, run: &mut TrainingRun, phase: TrainingPhase, progress: f64) {
        run.advance(phase, progress);
        self.publish(run);
    }

    fn publish(&self, run: &TrainingRun) {
        let mut status = self.status.write();
        status.phase = run.status;
        status.current = Some(run.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::InMemorySource;
    use crate::matching::{SkillMatchConfig, SkillSemanticMatcher};
    use crate::trainer::TrainerConfig;

    fn controller(dir: &std::path::Path, records: usize) -> Arc<RetrainingController> {
        let matcher = Arc::new(SkillSemanticMatcher::exact_only(SkillMatchConfig::default()));
        let source = InMemorySource::new(SyntheticDataGenerator::default().generate().into_iter().take(records).collect());
        Arc::new(RetrainingController::new(
            RetrainingConfig::default(),
            HybridTrainer::new(TrainerConfig::default(), matcher),
            Arc::new(source),
            ArtifactStore::new(dir),
            Arc::new(ActiveModel::new()),
        ))
    }

    #[test]
    fn second_ticket_is_refused_until_the_first_drops() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path(), 10);

        let ticket = controller.try_start("first").unwrap();
        assert!(controller.is_running());
        assert_eq!(controller.status().phase, TrainingPhase::Collecting);
        assert!(controller.try_start("second").is_err());
        assert_eq!(
            controller.run_once(RunRequest::default()),
            RunOutcome::Skipped(SkipReason::AlreadyRunning)
        );

        drop(ticket);
        assert!(!controller.is_running());
        assert_eq!(controller.status().phase, TrainingPhase::Idle);
        assert!(controller.try_start("third").is_ok());
    }

    fn finished(outcome: RunOutcome) -> TrainingRun {
        match outcome {
            RunOutcome::Finished(run) => run,
            other => panic!("expected a finished run, got {other:?}"),
        }
    }

    fn mark_trained_now(controller: &RetrainingController) {
        let mut run = TrainingRun::started("earlier");
        run.finish(TrainingPhase::Deployed, "deployed");
        controller.history().append(run).unwrap();
    }

    #[test]
    fn small_dataset_ends_as_a_skipped_run() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path(), 50);

        let run = finished(controller.run_once(RunRequest {
            force: true,
            ..RunRequest::default()
        }));
        assert_eq!(run.status, TrainingPhase::Rejected);
        assert_eq!(
            run.skipped,
            Some(SkipReason::InsufficientData {
                records: 50,
                required: 500
            })
        );
        assert!(run.completed_at.is_some());
        assert_eq!(controller.history().find(&run.training_id), Some(run.clone()));
        assert_eq!(controller.status().last, Some(run));
        assert_eq!(controller.status().phase, TrainingPhase::Idle);
        assert!(!controller.active().is_loaded());
    }

    #[test]
    fn claimed_run_that_is_not_due_still_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path(), 600);
        mark_trained_now(&controller);

        let ticket = controller.try_start("manual").unwrap();
        let run = finished(ticket.run(RunRequest::default()));
        assert_eq!(run.training_id, "manual");
        assert_eq!(run.skipped, Some(SkipReason::NotDue));
        assert_eq!(controller.history().find("manual").map(|r| r.status), Some(TrainingPhase::Rejected));
        assert_eq!(controller.history().last_training_at(), controller.history().find("earlier").map(|r| r.started_at));
    }

    #[test]
    fn scheduler_tick_that_is_not_due_claims_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path(), 600);
        mark_trained_now(&controller);

        assert_eq!(
            controller.run_once(RunRequest::default()),
            RunOutcome::Skipped(SkipReason::NotDue)
        );
        assert_eq!(controller.history().len(), 1);
        assert!(controller.status().last.is_none());
    }
}
