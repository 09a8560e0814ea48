//! Library facade over scoring and retraining: what a transport layer (HTTP,
//! CLI, job runner) calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::artifact::{ActiveModel, ArtifactError, ArtifactStore, TrainingMetrics};
use crate::data_source::TrainingDataSource;
use crate::matching::SkillSemanticMatcher;
use crate::retraining::{
    FeedbackEntry, HistoryError, RetrainingConfig, RetrainingController, RunOutcome, RunRequest, TrainingBusy,
    TrainingHistory, TrainingPhase, TrainingRun, TrainingStatus,
};
use crate::scoring::{RecommendationBatch, RecommendationEngine, DEFAULT_MAX_RECOMMENDATIONS};
use crate::trainer::{EvaluationReport, HybridTrainer, TrainerConfig};
use crate::{run_id, Candidate, Task};

/// Ledger file kept next to the model bundles.
pub const HISTORY_FILE: &str = "training_history.jsonl";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    TrainingInProgress(#[from] TrainingBusy),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("training task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub model_loaded: bool,
    pub model_version: Option<String>,
    pub last_training_date: Option<DateTime<Utc>>,
    pub performance_metrics: Option<TrainingMetrics>,
    pub training_phase: TrainingPhase,
}

/// A training pass running on the blocking pool.
pub struct TrainingJob {
    pub training_id: String,
    handle: JoinHandle<RunOutcome>,
}

impl TrainingJob {
    pub async fn wait(self) -> Result<RunOutcome, ServiceError> {
        Ok(self.handle.await?)
    }
}

pub struct RecommendationService {
    engine: RecommendationEngine,
    controller: Arc<RetrainingController>,
}

impl RecommendationService {
    pub fn new(engine: RecommendationEngine, controller: Arc<RetrainingController>) -> Self {
        Self { engine, controller }
    }

    /// Wire everything from `REC_*` variables around `source`, with the
    /// training ledger stored beside the model bundles, then load the active
    /// bundle if there is one.
    pub fn from_env(source: Arc<dyn TrainingDataSource>) -> Result<Self, ServiceError> {
        let matcher = Arc::new(SkillSemanticMatcher::from_env());
        let trainer_config = TrainerConfig::from_env();
        let weights = trainer_config.weights;
        let store = ArtifactStore::from_env();
        let history = Arc::new(TrainingHistory::open(store.root().join(HISTORY_FILE))?);

        let controller = RetrainingController::new(
            RetrainingConfig::from_env(),
            HybridTrainer::new(trainer_config, Arc::clone(&matcher)),
            source,
            store,
            Arc::new(ActiveModel::new()),
        )
        .with_history(history);

        let service = Self::new(RecommendationEngine::new(matcher, weights), Arc::new(controller));
        service.load_active()?;
        Ok(service)
    }

    pub fn controller(&self) -> &Arc<RetrainingController> {
        &self.controller
    }

    /// Install the bundle `ACTIVE` points at, warming the skill embedding
    /// cache from it. Returns the loaded version.
    pub fn load_active(&self) -> Result<Option<String>, ServiceError> {
        let Some(artifact) = self.controller.store().load_active()? else {
            warn!(root = %self.controller.store().root().display(), "no active model; serving with the rule-based scorer");
            return Ok(None);
        };
        let warmed = self.engine.matcher().cache().warm(&artifact.embedding_cache);
        let version = artifact.version().to_string();
        metrics::gauge!("rec_active_model_f1").set(artifact.metadata.training_metrics.hybrid.f1);
        self.controller.active().swap(Arc::new(artifact));
        info!(model_version = %version, warmed_embeddings = warmed, "active model loaded");
        Ok(Some(version))
    }

    /// Start a training pass off the request path and return its id right
    /// away. Poll `training_run` for the result. Needs a tokio runtime.
    pub fn train(&self, use_synthetic: bool, force: bool, months_back: Option<u32>) -> Result<String, ServiceError> {
        let job = self.start_training(RunRequest {
            force: force || use_synthetic,
            synthetic: use_synthetic,
            months_back,
        })?;
        Ok(job.training_id)
    }

    /// Like `train`, but hands back the job so the caller can await it.
    pub fn start_training(&self, request: RunRequest) -> Result<TrainingJob, ServiceError> {
        let ticket = self.controller.try_start(run_id::generate())?;
        let training_id = ticket.training_id().to_string();
        info!(training_id = %training_id, ?request, "training scheduled");
        let handle = tokio::task::spawn_blocking(move || ticket.run(request));
        Ok(TrainingJob { training_id, handle })
    }

    pub fn training_status(&self) -> TrainingStatus {
        self.controller.status()
    }

    /// The run with this id: in progress, or from the ledger once finished.
    pub fn training_run(&self, training_id: &str) -> Option<TrainingRun> {
        let status = self.controller.status();
        status
            .current
            .filter(|run| run.training_id == training_id)
            .or_else(|| self.controller.history().find(training_id))
    }

    pub fn predict(&self, task: &Task, candidates: &[Candidate], max_recommendations: Option<usize>) -> RecommendationBatch {
        self.engine.recommend(
            self.controller.active().get(),
            task,
            candidates,
            max_recommendations.unwrap_or(DEFAULT_MAX_RECOMMENDATIONS),
        )
    }

    pub fn health(&self) -> HealthReport {
        let active = self.controller.active().get();
        HealthReport {
            model_loaded: active.is_some(),
            model_version: active.as_ref().map(|a| a.version().to_string()),
            last_training_date: active.as_ref().map(|a| a.metadata.training_date),
            performance_metrics: active.as_ref().map(|a| a.metadata.training_metrics.clone()),
            training_phase: self.controller.status().phase,
        }
    }

    /// Report how a recommendation turned out; feeds the degradation trigger.
    pub fn record_prediction_feedback(
        &self,
        task_id: impl Into<String>,
        candidate_id: impl Into<String>,
        predicted_success: bool,
        actual_success: bool,
    ) {
        self.controller.feedback().record(FeedbackEntry {
            recorded_at: Utc::now(),
            task_id: task_id.into(),
            candidate_id: candidate_id.into(),
            predicted_success,
            actual_success,
        });
    }

    pub fn last_evaluation(&self) -> Option<EvaluationReport> {
        self.controller.last_evaluation()
    }
}
