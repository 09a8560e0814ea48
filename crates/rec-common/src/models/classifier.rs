use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::evaluation::{
    accuracy, class_counts, mean_std, roc_auc, stratified_kfold, stratified_split, weighted_f1,
    weighted_precision_recall_f1,
};
use super::forest::{ClassWeight, ForestParams, RandomForest};
use super::scaler::StandardScaler;
use super::smote::smote;
use super::ModelError;
use crate::features::FeatureMatrix;

/// Hyperparameter grid searched when `grid_search` is on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub class_weight: Vec<ClassWeight>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 200, 300],
            max_depth: vec![Some(10), Some(15), Some(20), None],
            min_samples_split: vec![2, 5, 10],
            min_samples_leaf: vec![1, 2, 4],
            class_weight: vec![ClassWeight::Balanced, ClassWeight::Uniform],
        }
    }
}

impl ParamGrid {
    pub fn candidates(&self, random_state: u64) -> Vec<ForestParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        for &class_weight in &self.class_weight {
                            out.push(ForestParams {
                                n_estimators,
                                max_depth,
                                min_samples_split,
                                min_samples_leaf,
                                class_weight,
                                random_state,
                            });
                        }
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub forest: ForestParams,
    pub test_size: f64,
    pub cv_folds: usize,
    pub grid_search: bool,
    pub param_grid: ParamGrid,
    /// Majority/minority ratio above which SMOTE is considered.
    pub smote_ratio: f64,
    /// Minority rows needed before SMOTE is used.
    pub smote_min_minority: usize,
    pub random_state: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            test_size: 0.2,
            cv_folds: 5,
            grid_search: false,
            param_grid: ParamGrid::default(),
            smote_ratio: 2.0,
            smote_min_minority: 6,
            random_state: 42,
        }
    }
}

impl ClassifierConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let random_state = env_parse("REC_RANDOM_STATE").unwrap_or(defaults.random_state);
        Self {
            forest: ForestParams {
                n_estimators: env_parse("REC_RF_N_ESTIMATORS").unwrap_or(defaults.forest.n_estimators),
                max_depth: match std::env::var("REC_RF_MAX_DEPTH").ok().as_deref() {
                    Some("none") | Some("None") => None,
                    Some(v) => v.parse().ok().or(defaults.forest.max_depth),
                    None => defaults.forest.max_depth,
                },
                random_state,
                ..defaults.forest
            },
            test_size: env_parse("REC_TEST_SIZE")
                .filter(|v: &f64| *v > 0.0 && *v < 1.0)
                .unwrap_or(defaults.test_size),
            cv_folds: env_parse("REC_CV_FOLDS").unwrap_or(defaults.cv_folds),
            grid_search: std::env::var("REC_GRID_SEARCH")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.grid_search),
            random_state,
            ..defaults
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Fitted scaler plus forest; rows go in raw and come out as positive-class
/// probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentClassifier {
    pub scaler: StandardScaler,
    pub forest: RandomForest,
}

impl ContentClassifier {
    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let scaled = self.scaler.transform(rows)?;
        Ok(self.forest.predict_proba(&scaled))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: Option<f64>,
    #[serde(default)]
    pub cv_f1_mean: Option<f64>,
    #[serde(default)]
    pub cv_f1_std: Option<f64>,
}

impl ClassificationMetrics {
    pub fn evaluate(y_true: &[u8], y_pred: &[u8], scores: &[f64]) -> Self {
        let (precision, recall, f1) = weighted_precision_recall_f1(y_true, y_pred);
        Self {
            accuracy: accuracy(y_true, y_pred),
            precision,
            recall,
            f1,
            roc_auc: roc_auc(y_true, scores),
            cv_f1_mean: None,
            cv_f1_std: None,
        }
    }
}

/// How class imbalance was handled for the training split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resampling {
    Smote { k: usize, synthetic_rows: usize },
    ClassWeights,
}

/// Held-out split predictions, reused by the hybrid evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Holdout {
    /// Indices into the matrix passed to `fit`.
    pub rows: Vec<usize>,
    pub labels: Vec<u8>,
    pub probabilities: Vec<f64>,
    pub predictions: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ClassifierFit {
    pub classifier: ContentClassifier,
    pub importances: Vec<(String, f64)>,
    pub metrics: ClassificationMetrics,
    pub holdout: Holdout,
    pub resampling: Resampling,
    pub params: ForestParams,
}

pub struct ContentClassifierTrainer {
    config: ClassifierConfig,
}

impl ContentClassifierTrainer {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Split, scale, rebalance, fit and evaluate.
    #[instrument(skip_all, fields(rows = matrix.n_rows(), features = matrix.n_cols()))]
    pub fn fit(&self, matrix: &FeatureMatrix, labels: &[u8]) -> Result<ClassifierFit, ModelError> {
        if matrix.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if matrix.n_rows() != labels.len() {
            return Err(ModelError::LengthMismatch {
                rows: matrix.n_rows(),
                labels: labels.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        let (train_idx, mut test_idx) = stratified_split(labels, self.config.test_size, &mut rng);
        if test_idx.is_empty() {
            warn!(rows = labels.len(), "too few rows for a held-out split; evaluating on training rows");
            test_idx = train_idx.clone();
        }

        let rows = matrix.rows();
        let train_raw: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].clone()).collect();
        let test_raw: Vec<Vec<f64>> = test_idx.iter().map(|&i| rows[i].clone()).collect();
        let train_y: Vec<u8> = train_idx.iter().map(|&i| labels[i]).collect();
        let test_y: Vec<u8> = test_idx.iter().map(|&i| labels[i]).collect();

        let scaler = StandardScaler::fit(&train_raw)?;
        let train_x = scaler.transform(&train_raw)?;
        let test_x = scaler.transform(&test_raw)?;

        let (train_x, train_y, resampling, class_weight) = self.rebalance(train_x, train_y, &mut rng);
        let mut params = ForestParams {
            class_weight,
            random_state: self.config.random_state,
            ..self.config.forest.clone()
        };
        if self.config.grid_search {
            params = self.grid_search(&train_x, &train_y, params)?;
        }

        let forest = RandomForest::fit(&train_x, &train_y, &params)?;
        let probabilities = forest.predict_proba(&test_x);
        let predictions: Vec<u8> = probabilities.iter().map(|&p| u8::from(p >= 0.5)).collect();

        let mut metrics = ClassificationMetrics::evaluate(&test_y, &predictions, &probabilities);
        if let Some((mean, std)) = self.cross_validate(&train_x, &train_y, &params)? {
            metrics.cv_f1_mean = Some(mean);
            metrics.cv_f1_std = Some(std);
        }
        if metrics.roc_auc.is_none() {
            warn!("held-out split has a single class; ROC-AUC undefined");
        }
        info!(
            accuracy = metrics.accuracy,
            f1 = metrics.f1,
            roc_auc = ?metrics.roc_auc,
            resampling = ?resampling,
            "content classifier trained"
        );

        let importances = matrix
            .columns()
            .iter()
            .cloned()
            .zip(forest.feature_importances().iter().copied())
            .collect();

        Ok(ClassifierFit {
            classifier: ContentClassifier { scaler, forest },
            importances,
            metrics,
            holdout: Holdout {
                rows: test_idx,
                labels: test_y,
                probabilities,
                predictions,
            },
            resampling,
            params,
        })
    }

    fn rebalance(
        &self,
        x: Vec<Vec<f64>>,
        y: Vec<u8>,
        rng: &mut StdRng,
    ) -> (Vec<Vec<f64>>, Vec<u8>, Resampling, ClassWeight) {
        let counts = class_counts(&y);
        let minority = counts[0].min(counts[1]);
        let majority = counts[0].max(counts[1]);
        let ratio = if minority == 0 {
            f64::INFINITY
        } else {
            majority as f64 / minority as f64
        };

        if minority > 0 && ratio > self.config.smote_ratio && minority >= self.config.smote_min_minority {
            let k = 5.min(minority - 1);
            let before = y.len();
            let (x, y) = smote(&x, &y, k, rng);
            let synthetic_rows = y.len() - before;
            info!(k, synthetic_rows, ratio, "class imbalance: SMOTE applied");
            (x, y, Resampling::Smote { k, synthetic_rows }, ClassWeight::Uniform)
        } else {
            (x, y, Resampling::ClassWeights, ClassWeight::Balanced)
        }
    }

    fn folds(&self, labels: &[u8]) -> usize {
        let counts = class_counts(labels);
        self.config.cv_folds.min(counts[0].min(counts[1]))
    }

    fn cross_validate(
        &self,
        x: &[Vec<f64>],
        y: &[u8],
        params: &ForestParams,
    ) -> Result<Option<(f64, f64)>, ModelError> {
        let k = self.folds(y);
        if k < 2 {
            return Ok(None);
        }
        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        let mut scores = Vec::with_capacity(k);
        for (train, validation) in stratified_kfold(y, k, &mut rng) {
            let fx: Vec<Vec<f64>> = train.iter().map(|&i| x[i].clone()).collect();
            let fy: Vec<u8> = train.iter().map(|&i| y[i]).collect();
            let vx: Vec<Vec<f64>> = validation.iter().map(|&i| x[i].clone()).collect();
            let vy: Vec<u8> = validation.iter().map(|&i| y[i]).collect();
            let forest = RandomForest::fit(&fx, &fy, params)?;
            scores.push(weighted_f1(&vy, &forest.predict(&vx)));
        }
        Ok(mean_std(&scores))
    }

    fn grid_search(&self, x: &[Vec<f64>], y: &[u8], fallback: ForestParams) -> Result<ForestParams, ModelError> {
        let mut best: Option<(f64, ForestParams)> = None;
        for candidate in self.config.param_grid.candidates(self.config.random_state) {
            let Some((score, _)) = self.cross_validate(x, y, &candidate)? else {
                warn!("too few rows per class for grid search; keeping configured parameters");
                return Ok(fallback);
            };
            if best.as_ref().map_or(true, |(top, _)| score > *top) {
                best = Some((score, candidate));
            }
        }
        let Some((score, params)) = best else {
            return Ok(fallback);
        };
        info!(score, params = ?params, "grid search selected parameters");
        Ok(params)
    }
}
