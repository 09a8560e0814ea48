pub mod classifier;
pub mod collaborative;
pub mod evaluation;
pub mod forest;
pub mod scaler;
pub mod smote;

use thiserror::Error;

pub use classifier::{
    ClassificationMetrics, ClassifierConfig, ClassifierFit, ContentClassifier, ContentClassifierTrainer, Holdout,
    ParamGrid, Resampling,
};
pub use collaborative::{
    CollaborativeConfig, CollaborativeMetrics, CollaborativeModel, CollaborativeTrainer, Factorization, UserProfile,
};
pub use forest::{ClassWeight, ForestParams, RandomForest};
pub use scaler::StandardScaler;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("row count {rows} does not match label count {labels}")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// JSON has no infinity; non-finite floats are written as `null` and read
/// back as `+inf`.
pub(crate) mod non_finite {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        value.is_finite().then_some(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}
