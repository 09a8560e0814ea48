use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rec_common::artifact::{ActiveModel, ArtifactStore};
use rec_common::data_source::{DataSourceError, InMemorySource, TrainingDataSource};
use rec_common::embedding::{EmbeddingCache, EmbeddingConfig, HashSkillEmbedder};
use rec_common::matching::{SkillMatchConfig, SkillSemanticMatcher};
use rec_common::models::{ClassifierConfig, ForestParams};
use rec_common::retraining::{
    ModelUpdateEvent, ModelUpdateNotifier, RetrainingConfig, RetrainingController, RunOutcome, RunRequest, SkipReason,
    TrainingPhase, TrainingRun, TriggerReason,
};
use rec_common::schema::InteractionRecord;
use rec_common::scoring::{HybridWeights, RecommendationEngine};
use rec_common::service::{RecommendationService, ServiceError};
use rec_common::synthetic::{SyntheticConfig, SyntheticDataGenerator};
use rec_common::trainer::{HybridTrainer, TrainerConfig};
use rec_common::{Candidate, Task};

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<ModelUpdateEvent>>,
}

impl ModelUpdateNotifier for RecordingNotifier {
    fn model_updated(&self, event: &ModelUpdateEvent) {
        self.events.lock().push(event.clone());
    }
}

struct PanickingNotifier;

impl ModelUpdateNotifier for PanickingNotifier {
    fn model_updated(&self, _event: &ModelUpdateEvent) {
        panic!("webhook unreachable")
    }
}

struct FailingSource;

impl TrainingDataSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    fn collect(&self, _months_back: u32) -> Result<Vec<InteractionRecord>, DataSourceError> {
        Err(DataSourceError::Io {
            path: "warehouse/export.jsonl".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "warehouse offline"),
        })
    }

    fn count_records_since(&self, _since: DateTime<Utc>) -> Result<usize, DataSourceError> {
        Ok(0)
    }
}

struct PanickingSource;

impl TrainingDataSource for PanickingSource {
    fn name(&self) -> &str {
        "panicking"
    }

    fn collect(&self, _months_back: u32) -> Result<Vec<InteractionRecord>, DataSourceError> {
        panic!("source exploded")
    }

    fn count_records_since(&self, _since: DateTime<Utc>) -> Result<usize, DataSourceError> {
        Ok(0)
    }
}

fn matcher() -> Arc<SkillSemanticMatcher> {
    Arc::new(SkillSemanticMatcher::new(
        Some(Arc::new(HashSkillEmbedder::new(EmbeddingConfig::default()))),
        Arc::new(EmbeddingCache::new()),
        SkillMatchConfig::default(),
    ))
}

fn fast_trainer_config() -> TrainerConfig {
    TrainerConfig {
        classifier: ClassifierConfig {
            forest: ForestParams {
                n_estimators: 15,
                max_depth: Some(8),
                ..ForestParams::default()
            },
            cv_folds: 3,
            ..ClassifierConfig::default()
        },
        ..TrainerConfig::default()
    }
}

fn small_generator(seed: u64) -> SyntheticDataGenerator {
    SyntheticDataGenerator::new(SyntheticConfig {
        users: 60,
        tasks: 120,
        interactions: 600,
        seed,
    })
}

fn build_controller(
    dir: &Path,
    matcher: Arc<SkillSemanticMatcher>,
    source: Arc<dyn TrainingDataSource>,
    notifier: Arc<RecordingNotifier>,
) -> Arc<RetrainingController> {
    Arc::new(
        RetrainingController::new(
            RetrainingConfig::default(),
            HybridTrainer::new(fast_trainer_config(), matcher),
            source,
            ArtifactStore::new(dir),
            Arc::new(ActiveModel::new()),
        )
        .with_notifier(notifier)
        .with_synthetic_source(Arc::new(small_generator(5))),
    )
}

fn finished(outcome: RunOutcome) -> TrainingRun {
    match outcome {
        RunOutcome::Finished(run) => run,
        RunOutcome::Skipped(reason) => panic!("run skipped: {reason:?}"),
    }
}

#[test]
fn first_run_deploys_and_later_runs_are_gated() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let source = Arc::new(InMemorySource::new(small_generator(11).generate()));
    let controller = build_controller(dir.path(), matcher(), source, Arc::clone(&notifier));

    let first = finished(controller.run_once(RunRequest::default()));
    assert_eq!(first.status, TrainingPhase::Deployed, "{:?}", first.message);
    assert_eq!(first.trigger, Some(TriggerReason::FirstTraining));
    assert_eq!(first.records, Some(600));
    assert!(first.decision.as_ref().unwrap().first_training);
    let version = first.model_version.clone().unwrap();

    assert_eq!(controller.active().get().unwrap().version(), version);
    assert_eq!(controller.store().active_version().unwrap(), Some(version.clone()));
    assert_eq!(notifier.events.lock().len(), 1);
    assert!(notifier.events.lock()[0].previous_version.is_none());

    let evaluation = controller.last_evaluation().unwrap();
    assert_eq!(evaluation.true_labels.len(), evaluation.predicted_probabilities.len());
    assert_eq!(evaluation.model_version, version);

    let reloaded = ArtifactStore::new(dir.path()).load_active().unwrap().unwrap();
    assert_eq!(reloaded.version(), version);
    assert!(!reloaded.embedding_cache.is_empty());
    assert!(!reloaded.schema.text.is_empty());
    assert!(reloaded.schema.feature_columns.iter().any(|c| c.starts_with("tfidf_")));

    // Nothing new since the last run.
    assert_eq!(
        controller.run_once(RunRequest::default()),
        RunOutcome::Skipped(SkipReason::NotDue)
    );

    // Same data again: no improvement, so the deployed model stays.
    let second = finished(controller.run_once(RunRequest {
        force: true,
        ..RunRequest::default()
    }));
    assert_eq!(second.status, TrainingPhase::Rejected, "{:?}", second.message);
    assert_eq!(second.trigger, Some(TriggerReason::Forced));
    assert!(!second.deployed);
    assert_eq!(controller.active().get().unwrap().version(), version);
    assert_eq!(notifier.events.lock().len(), 1);

    assert_eq!(controller.history().len(), 2);
    assert_eq!(controller.status().phase, TrainingPhase::Idle);
    assert_eq!(controller.status().last.unwrap().status, TrainingPhase::Rejected);
}

#[test]
fn degraded_feedback_triggers_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemorySource::new(small_generator(11).generate()));
    let controller = build_controller(dir.path(), matcher(), source, Arc::default());

    let first = finished(controller.run_once(RunRequest::default()));
    assert_eq!(first.status, TrainingPhase::Deployed);

    let now = Utc::now();
    for i in 0..20 {
        controller.feedback().record(rec_common::retraining::FeedbackEntry {
            recorded_at: now,
            task_id: format!("t{i}"),
            candidate_id: "c".into(),
            predicted_success: true,
            actual_success: false,
        });
    }

    let run = finished(controller.run_once(RunRequest::default()));
    assert!(
        matches!(run.trigger, Some(TriggerReason::PerformanceDegradation { current, .. }) if current == 0.0),
        "{:?}",
        run.trigger
    );
}

#[test]
fn synthetic_runs_bypass_the_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let controller = build_controller(dir.path(), matcher(), Arc::new(InMemorySource::default()), Arc::default());

    let run = finished(controller.run_once(RunRequest {
        synthetic: true,
        ..RunRequest::default()
    }));
    assert_eq!(run.trigger, Some(TriggerReason::Synthetic));
    assert_eq!(run.status, TrainingPhase::Deployed);
}

#[test]
fn source_errors_end_as_failed_runs() {
    let dir = tempfile::tempdir().unwrap();
    let controller = build_controller(dir.path(), matcher(), Arc::new(FailingSource), Arc::default());

    let run = finished(controller.run_once(RunRequest {
        force: true,
        ..RunRequest::default()
    }));
    assert_eq!(run.status, TrainingPhase::Failed);
    assert!(run.message.as_deref().unwrap().contains("warehouse offline"));
    assert!(!controller.active().is_loaded());
    assert_eq!(controller.history().find(&run.training_id).unwrap().status, TrainingPhase::Failed);
    assert!(!controller.is_running());
}

#[test]
fn panics_inside_a_run_are_contained() {
    let dir = tempfile::tempdir().unwrap();
    let controller = build_controller(dir.path(), matcher(), Arc::new(PanickingSource), Arc::default());

    let run = finished(controller.run_once(RunRequest {
        force: true,
        ..RunRequest::default()
    }));
    assert_eq!(run.status, TrainingPhase::Failed);
    assert_eq!(run.message.as_deref(), Some("source exploded"));
    assert_eq!(controller.status().phase, TrainingPhase::Idle);
    assert!(controller.try_start("next").is_ok());
}

#[test]
fn a_panicking_notifier_does_not_undo_a_deployment() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemorySource::new(small_generator(11).generate()));
    let controller = Arc::new(
        RetrainingController::new(
            RetrainingConfig::default(),
            HybridTrainer::new(fast_trainer_config(), matcher()),
            source,
            ArtifactStore::new(dir.path()),
            Arc::new(ActiveModel::new()),
        )
        .with_notifier(Arc::new(PanickingNotifier)),
    );

    let run = finished(controller.run_once(RunRequest::default()));
    assert_eq!(run.status, TrainingPhase::Deployed, "{:?}", run.message);
    assert!(run.deployed);
    let version = run.model_version.clone().unwrap();
    assert_eq!(controller.active().get().unwrap().version(), version);
    assert_eq!(controller.store().active_version().unwrap(), Some(version));
    assert_eq!(controller.history().find(&run.training_id).unwrap().status, TrainingPhase::Deployed);
    assert_eq!(controller.status().last.unwrap().status, TrainingPhase::Deployed);
}

fn service(dir: &Path, matcher: Arc<SkillSemanticMatcher>) -> RecommendationService {
    service_over(dir, matcher, small_generator(11).generate())
}

fn service_over(dir: &Path, matcher: Arc<SkillSemanticMatcher>, records: Vec<InteractionRecord>) -> RecommendationService {
    let source = Arc::new(InMemorySource::new(records));
    let controller = build_controller(dir, Arc::clone(&matcher), source, Arc::default());
    RecommendationService::new(
        RecommendationEngine::new(matcher, HybridWeights::default()),
        controller,
    )
}

fn roster() -> Vec<Candidate> {
    (0..6)
        .map(|i| Candidate {
            id: format!("user_{}", i + 1),
            skills: vec!["Python".into(), "SQL".into(), "Docker".into()],
            seniority_level: Some(if i % 2 == 0 { "SENIOR" } else { "MID_LEVEL" }.into()),
            years_experience: Some(3.0 + f64::from(i)),
            utilization: Some(0.5),
            capacity: Some(40.0),
            performance_score: Some(0.6 + 0.05 * f64::from(i)),
            success_rate: Some(0.7),
            ..Candidate::default()
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_trains_off_the_request_path_and_serves_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), matcher());
    let task = Task {
        id: Some("task_x".into()),
        priority: Some("HIGH".into()),
        difficulty: Some("MEDIUM".into()),
        required_skills: vec!["Python".into(), "SQL".into()],
        estimated_hours: Some(16.0),
        ..Task::default()
    };

    let before = service.predict(&task, &roster(), Some(3));
    assert!(before.fallback);
    assert!(!service.health().model_loaded);

    let held = service.controller().try_start("manual").unwrap();
    assert!(matches!(
        service.train(false, true, None),
        Err(ServiceError::TrainingInProgress(_))
    ));
    drop(held);

    let job = service
        .start_training(RunRequest {
            force: true,
            ..RunRequest::default()
        })
        .unwrap();
    let training_id = job.training_id.clone();
    let run = finished(job.wait().await.unwrap());
    assert_eq!(run.status, TrainingPhase::Deployed);
    assert_eq!(service.training_run(&training_id).unwrap().status, TrainingPhase::Deployed);

    let batch = service.predict(&task, &roster(), Some(3));
    assert!(!batch.fallback);
    assert_eq!(batch.model_version, run.model_version);
    assert_eq!(batch.results.len(), 3);
    assert_eq!(batch.results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(batch.results.iter().all(|r| r.content_score.is_some()));
    assert!(batch.results.windows(2).all(|w| w[0].final_score >= w[1].final_score));

    let health = service.health();
    assert!(health.model_loaded);
    assert_eq!(health.model_version, run.model_version);
    assert!(health.performance_metrics.is_some());

    service.record_prediction_feedback("task_x", "user_1", true, true);
    assert_eq!(service.controller().feedback().len(), 1);

    // A fresh process picks the bundle up from disk and warms its cache.
    let fresh_matcher = matcher();
    let restarted = self::service(dir.path(), Arc::clone(&fresh_matcher));
    assert_eq!(restarted.load_active().unwrap(), run.model_version);
    assert!(!fresh_matcher.cache().is_empty());
    assert!(!restarted.predict(&task, &roster(), None).fallback);
}

/// Waits for the ledger entry behind an id handed out by `train`.
async fn settled_run(service: &RecommendationService, training_id: &str) -> TrainingRun {
    for _ in 0..2400 {
        let run = service.training_run(training_id).filter(|run| run.completed_at.is_some());
        if let Some(run) = run.filter(|_| !service.controller().is_running()) {
            return run;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    panic!("training run {training_id} never finished")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn short_datasets_still_resolve_their_training_id() {
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<InteractionRecord> = small_generator(3).generate().into_iter().take(50).collect();
    let service = service_over(dir.path(), matcher(), records);

    let training_id = service.train(false, true, None).unwrap();
    let run = settled_run(&service, &training_id).await;
    assert_eq!(run.status, TrainingPhase::Rejected);
    assert_eq!(
        run.skipped,
        Some(SkipReason::InsufficientData {
            records: 50,
            required: 500
        })
    );
    assert!(!service.health().model_loaded);
    assert_eq!(service.training_status().phase, TrainingPhase::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unforced_requests_that_are_not_due_still_resolve_their_training_id() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), matcher());

    let first = service.train(false, false, None).unwrap();
    assert_eq!(settled_run(&service, &first).await.status, TrainingPhase::Deployed);

    let second = service.train(false, false, None).unwrap();
    let run = settled_run(&service, &second).await;
    assert_eq!(run.skipped, Some(SkipReason::NotDue));
    assert_eq!(run.status, TrainingPhase::Rejected);
    assert_eq!(service.controller().history().len(), 2);
    assert!(service.training_run("never-issued").is_none());
}
