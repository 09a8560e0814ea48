//! One full training pass: features, content classifier, collaborative model,
//! hybrid evaluation, and the resulting model artifact.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::artifact::{ArtifactMetadata, ModelArtifact, TrainingMetrics, ARTIFACT_FORMAT};
use crate::features::FeaturePipeline;
use crate::matching::SkillSemanticMatcher;
use crate::models::{
    ClassificationMetrics, ClassifierConfig, CollaborativeConfig, CollaborativeTrainer, ContentClassifierTrainer,
    ModelError,
};
use crate::schema::InteractionRecord;
use crate::scoring::{collaborative_score, HybridWeights};
use crate::{run_id, Candidate};

/// Hybrid scores at or above this count as a positive prediction.
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no training records")]
    EmptyDataset,
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Default)]
pub struct TrainerConfig {
    pub classifier: ClassifierConfig,
    pub collaborative: CollaborativeConfig,
    pub weights: HybridWeights,
}

impl TrainerConfig {
    pub fn from_env() -> Self {
        Self {
            classifier: ClassifierConfig::from_env(),
            collaborative: CollaborativeConfig::default(),
            weights: HybridWeights::from_env(),
        }
    }
}

/// What reporting tools consume: held-out labels, predictions, scores and
/// the global feature importances of the model they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_version: String,
    pub true_labels: Vec<u8>,
    pub predicted_labels: Vec<u8>,
    pub predicted_probabilities: Vec<f64>,
    pub feature_importances: Vec<(String, f64)>,
    pub metrics: ClassificationMetrics,
}

impl EvaluationReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub evaluation: EvaluationReport,
}

impl TrainingOutcome {
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.artifact.metadata.training_metrics
    }
}

pub struct HybridTrainer {
    config: TrainerConfig,
    matcher: Arc<SkillSemanticMatcher>,
}

impl HybridTrainer {
    pub fn new(config: TrainerConfig, matcher: Arc<SkillSemanticMatcher>) -> Self {
        Self { config, matcher }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    #[instrument(skip_all, fields(training_id = %training_id, records = records.len()))]
    pub fn train(&self, records: &[InteractionRecord], training_id: &str) -> Result<TrainingOutcome, TrainingError> {
        if records.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }

        let pipeline = FeaturePipeline::new(Arc::clone(&self.matcher))
            .with_random_state(self.config.classifier.random_state);
        let features = pipeline.build_features(records);

        let classifier_fit =
            ContentClassifierTrainer::new(self.config.classifier.clone()).fit(&features.matrix, &features.labels)?;
        let collaborative = CollaborativeTrainer::new(self.config.collaborative.clone()).fit(records);

        // Hybrid evaluation on the classifier's held-out rows, with the
        // collaborative score computed exactly as at serving time.
        let holdout = &classifier_fit.holdout;
        let hybrid_scores: Vec<f64> = holdout
            .rows
            .iter()
            .zip(&holdout.probabilities)
            .map(|(&row, &content)| {
                let candidate = candidate_from_record(&records[row]);
                let collab = collaborative_score(&candidate, &collaborative.profiles).score;
                self.config.weights.combine(content, collab)
            })
            .collect();
        let hybrid_predictions: Vec<u8> = hybrid_scores
            .iter()
            .map(|&s| u8::from(s >= DECISION_THRESHOLD))
            .collect();
        let hybrid = ClassificationMetrics::evaluate(&holdout.labels, &hybrid_predictions, &hybrid_scores);

        let trained_at = Utc::now();
        let model_version = run_id::model_version(trained_at, training_id);
        info!(
            model_version = %model_version,
            content_f1 = classifier_fit.metrics.f1,
            hybrid_f1 = hybrid.f1,
            hybrid_accuracy = hybrid.accuracy,
            collaborative_rmse = collaborative.metrics.rmse,
            "hybrid model trained"
        );

        let evaluation = EvaluationReport {
            model_version: model_version.clone(),
            true_labels: holdout.labels.clone(),
            predicted_labels: hybrid_predictions,
            predicted_probabilities: hybrid_scores,
            feature_importances: classifier_fit.importances.clone(),
            metrics: hybrid.clone(),
        };

        let artifact = ModelArtifact {
            metadata: ArtifactMetadata {
                artifact_format: ARTIFACT_FORMAT,
                model_version,
                training_id: training_id.to_string(),
                training_date: trained_at,
                training_metrics: TrainingMetrics {
                    classifier: classifier_fit.metrics,
                    collaborative: collaborative.metrics.clone(),
                    hybrid,
                },
                feature_columns: features.schema.feature_columns.clone(),
                feature_importance: classifier_fit.importances,
                label_policy: features.label_policy,
                records: records.len(),
                embedder: self.matcher.embedder_identity(),
            },
            schema: features.schema,
            classifier: classifier_fit.classifier,
            collaborative,
            embedding_cache: self.matcher.cache().snapshot(),
        };

        Ok(TrainingOutcome { artifact, evaluation })
    }
}

fn candidate_from_record(record: &InteractionRecord) -> Candidate {
    Candidate {
        id: record.user_id.clone(),
        skills: record.user_skills.clone(),
        seniority_level: record.seniority_level.clone(),
        department_name: record.department_name.clone(),
        ..Candidate::default()
    }
}

