pub mod active;
pub mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{FeatureSchema, LabelPolicy};
use crate::models::{ClassificationMetrics, CollaborativeMetrics, CollaborativeModel, ContentClassifier};

pub use active::ActiveModel;
pub use store::ArtifactStore;

/// Bumped whenever a persisted member changes shape.
pub const ARTIFACT_FORMAT: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model {version} is missing {member}")]
    MissingMember { version: String, member: &'static str },
    #[error("artifact format {found} is not supported (expected {expected})")]
    IncompatibleFormat { found: u32, expected: u32 },
    #[error("model {version} is inconsistent: {reason}")]
    Inconsistent { version: String, reason: String },
    #[error("invalid model version {0:?}")]
    InvalidVersion(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub classifier: ClassificationMetrics,
    pub collaborative: CollaborativeMetrics,
    /// Hybrid score (content + collaborative) evaluated on the held-out split.
    pub hybrid: ClassificationMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub artifact_format: u32,
    pub model_version: String,
    pub training_id: String,
    pub training_date: DateTime<Utc>,
    pub training_metrics: TrainingMetrics,
    pub feature_columns: Vec<String>,
    pub feature_importance: Vec<(String, f64)>,
    pub label_policy: LabelPolicy,
    pub records: usize,
    /// `name:version` of the skill embedder the cache was built with.
    pub embedder: Option<String>,
}

/// One trained, immutable model bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub metadata: ArtifactMetadata,
    pub schema: FeatureSchema,
    pub classifier: ContentClassifier,
    pub collaborative: CollaborativeModel,
    pub embedding_cache: BTreeMap<String, Vec<f32>>,
}

impl ModelArtifact {
    pub fn version(&self) -> &str {
        &self.metadata.model_version
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.schema.feature_columns
    }

    /// Global importance for one feature column, 0.0 when unknown.
    pub fn importance_of(&self, column: &str) -> f64 {
        self.metadata
            .feature_importance
            .iter()
            .find(|(name, _)| name == column)
            .map_or(0.0, |(_, v)| *v)
    }

    /// Cross-member checks run after loading.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let inconsistent = |reason: String| ArtifactError::Inconsistent {
            version: self.metadata.model_version.clone(),
            reason,
        };
        if self.metadata.artifact_format != ARTIFACT_FORMAT {
            return Err(ArtifactError::IncompatibleFormat {
                found: self.metadata.artifact_format,
                expected: ARTIFACT_FORMAT,
            });
        }
        if self.metadata.feature_columns != self.schema.feature_columns {
            return Err(inconsistent("metadata and encoders disagree on feature columns".into()));
        }
        let width = self.schema.feature_columns.len();
        if self.classifier.scaler.n_features() != width || self.classifier.forest.n_features() != width {
            return Err(inconsistent(format!(
                "classifier expects {} / {} features, schema has {width}",
                self.classifier.scaler.n_features(),
                self.classifier.forest.n_features()
            )));
        }
        Ok(())
    }
}
