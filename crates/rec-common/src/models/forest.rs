use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::evaluation::class_counts;
use super::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Inverse class frequency: `n / (n_classes * n_class)`.
    Balanced,
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub class_weight: ClassWeight,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: Some(20),
            min_samples_split: 4,
            min_samples_leaf: 2,
            class_weight: ClassWeight::Balanced,
            random_state: 42,
        }
    }
}

impl ForestParams {
    fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidParameter("n_estimators must be positive".into()));
        }
        if self.min_samples_split < 2 {
            return Err(ModelError::InvalidParameter("min_samples_split must be at least 2".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(ModelError::InvalidParameter("min_samples_leaf must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf {
        positive: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART tree over weighted Gini impurity; leaves hold the weighted share of
/// the positive class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn predict_proba_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { positive }) => return *positive,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

fn gini(w: [f64; 2]) -> f64 {
    let total = w[0] + w[1];
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = w[0] / total;
    let p1 = w[1] / total;
    1.0 - p0 * p0 - p1 * p1
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [u8],
    class_weights: [f64; 2],
    params: &'a ForestParams,
    max_features: usize,
    nodes: Vec<Node>,
    importances: Vec<f64>,
    rng: StdRng,
}

impl TreeBuilder<'_> {
    fn weights(&self, samples: &[usize]) -> [f64; 2] {
        let mut w = [0.0; 2];
        for &s in samples {
            let class = usize::from(self.labels[s]);
            w[class] += self.class_weights[class];
        }
        w
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let w = self.weights(&samples);
        let total = w[0] + w[1];
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            positive: if total > 0.0 { w[1] / total } else { 0.0 },
        });

        let pure = w[0] <= 0.0 || w[1] <= 0.0;
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if pure
            || depth_reached
            || samples.len() < self.params.min_samples_split
            || samples.len() < 2 * self.params.min_samples_leaf
        {
            return idx;
        }

        let Some(split) = self.best_split(&samples, w) else {
            return idx;
        };
        self.importances[split.feature] += split.gain;

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&s| self.rows[s][split.feature] <= split.threshold);
        let left_idx = self.build(left, depth + 1);
        let right_idx = self.build(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_idx,
            right: right_idx,
        };
        idx
    }

    fn best_split(&mut self, samples: &[usize], parent: [f64; 2]) -> Option<Split> {
        let n_features = self.rows.first().map_or(0, Vec::len);
        let candidates = rand::seq::index::sample(&mut self.rng, n_features, self.max_features.min(n_features));
        let parent_impurity = gini(parent) * (parent[0] + parent[1]);
        let min_leaf = self.params.min_samples_leaf;

        let mut best: Option<Split> = None;
        let mut order = samples.to_vec();
        for feature in candidates.iter() {
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left = [0.0; 2];
            for i in 0..order.len() - 1 {
                let s = order[i];
                let class = usize::from(self.labels[s]);
                left[class] += self.class_weights[class];

                let value = self.rows[s][feature];
                let next = self.rows[order[i + 1]][feature];
                let left_n = i + 1;
                if next <= value || left_n < min_leaf || order.len() - left_n < min_leaf {
                    continue;
                }

                let right = [parent[0] - left[0], parent[1] - left[1]];
                let impurity = gini(left) * (left[0] + left[1]) + gini(right) * (right[0] + right[1]);
                let gain = parent_impurity - impurity;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mid = value + (next - value) / 2.0;
                    best = Some(Split {
                        feature,
                        threshold: if mid < next { mid } else { value },
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Bagged CART ensemble with sqrt feature sampling per split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], params: &ForestParams) -> Result<Self, ModelError> {
        params.validate()?;
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if rows.len() != labels.len() {
            return Err(ModelError::LengthMismatch {
                rows: rows.len(),
                labels: labels.len(),
            });
        }
        let n_features = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != n_features) {
            return Err(ModelError::DimensionMismatch {
                expected: n_features,
                actual: bad.len(),
            });
        }

        let class_weights = match params.class_weight {
            ClassWeight::Uniform => [1.0, 1.0],
            ClassWeight::Balanced => {
                let counts = class_counts(labels);
                let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
                counts.map(|c| {
                    if c > 0 {
                        labels.len() as f64 / (present * c as f64)
                    } else {
                        0.0
                    }
                })
            }
        };
        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let n = rows.len();

        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0; n_features];
        for t in 0..params.n_estimators {
            let mut rng = StdRng::seed_from_u64(params.random_state.wrapping_add(t as u64));
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
            let mut builder = TreeBuilder {
                rows,
                labels,
                class_weights,
                params,
                max_features,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
                rng,
            };
            builder.build(bootstrap, 0);

            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&builder.importances) {
                    *acc += v / tree_total;
                }
            }
            trees.push(DecisionTree { nodes: builder.nodes });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }

        Ok(Self {
            params: params.clone(),
            n_features,
            trees,
            feature_importances: importances,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean-decrease-in-impurity importances; sum to 1.0 unless no tree split.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn predict_proba_row(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict_proba_row(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_proba_row(r)).collect()
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<u8> {
        self.predict_proba(rows).into_iter().map(|p| u8::from(p >= 0.5)).collect()
    }
}
