use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::schema::{normalize_label, InteractionRecord, Seniority};
use crate::skill_normalizer::normalize_skills_vec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborativeConfig {
    pub min_users: usize,
    pub min_tasks: usize,
    pub max_components: usize,
}

impl Default for CollaborativeConfig {
    fn default() -> Self {
        Self {
            min_users: 10,
            min_tasks: 10,
            max_components: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborativeMetrics {
    /// `null` in JSON when infinite (degenerate fit).
    #[serde(with = "super::non_finite")]
    pub rmse: f64,
    pub coverage: f64,
    pub n_components: usize,
    pub explained_variance_ratio: f64,
    pub n_users: usize,
    pub n_tasks: usize,
}

impl CollaborativeMetrics {
    pub fn degenerate(n_users: usize, n_tasks: usize) -> Self {
        Self {
            rmse: f64::INFINITY,
            coverage: 0.0,
            n_components: 0,
            explained_variance_ratio: 0.0,
            n_users,
            n_tasks,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.n_components == 0
    }
}

/// Truncated SVD of the user x task performance matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factorization {
    pub user_ids: Vec<String>,
    pub task_ids: Vec<String>,
    /// `U * S`, one row per user.
    pub user_factors: Vec<Vec<f64>>,
    /// `V^T`, one row per component.
    pub components: Vec<Vec<f64>>,
    pub singular_values: Vec<f64>,
}

impl Factorization {
    pub fn n_components(&self) -> usize {
        self.singular_values.len()
    }

    /// Reconstructed performance for a known (user, task) pair.
    pub fn predict(&self, user_id: &str, task_id: &str) -> Option<f64> {
        let u = self.user_ids.iter().position(|id| id == user_id)?;
        let t = self.task_ids.iter().position(|id| id == task_id)?;
        Some(
            self.user_factors[u]
                .iter()
                .zip(&self.components)
                .map(|(f, component)| f * component[t])
                .sum(),
        )
    }
}

/// What the serving-time lookup needs to know about one historical user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub skills: Vec<String>,
    pub department: Option<String>,
    pub seniority: Option<String>,
    pub mean_performance: f64,
    pub interactions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborativeModel {
    pub factorization: Option<Factorization>,
    pub profiles: Vec<UserProfile>,
    pub metrics: CollaborativeMetrics,
}

/// NaN and -inf become 0.0, +inf becomes 1.0.
pub fn sanitize_cell(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value == f64::INFINITY {
        1.0
    } else if value == f64::NEG_INFINITY {
        0.0
    } else {
        value
    }
}

/// Canonical seniority label; unknown titles keep their normalized spelling.
pub fn canonical_seniority(raw: &str) -> String {
    Seniority::from_label(raw)
        .map(|s| s.as_ref().to_string())
        .unwrap_or_else(|| normalize_label(raw))
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Per-user aggregates; users with no performance signal at all are left out.
pub fn build_profiles(records: &[InteractionRecord]) -> Vec<UserProfile> {
    let mut grouped: BTreeMap<&str, Vec<&InteractionRecord>> = BTreeMap::new();
    for record in records {
        grouped.entry(record.user_id.as_str()).or_default().push(record);
    }

    grouped
        .into_iter()
        .filter_map(|(user_id, rows)| {
            let outcome: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.performance_score.filter(|v| v.is_finite()))
                .collect();
            let historical: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.historical_performance.filter(|v| v.is_finite()))
                .collect();
            let mean_performance = mean(&outcome).or_else(|| mean(&historical))?;

            let all_skills: Vec<String> = rows.iter().flat_map(|r| r.user_skills.iter().cloned()).collect();
            let department = rows.iter().rev().find_map(|r| r.department_name.as_deref());
            let seniority = rows.iter().rev().find_map(|r| r.seniority_level.as_deref());
            Some(UserProfile {
                user_id: user_id.to_string(),
                skills: normalize_skills_vec(&all_skills),
                department: department.map(normalize_label),
                seniority: seniority.map(canonical_seniority),
                mean_performance,
                interactions: rows.len(),
            })
        })
        .collect()
}

pub struct CollaborativeTrainer {
    config: CollaborativeConfig,
}

impl CollaborativeTrainer {
    pub fn new(config: CollaborativeConfig) -> Self {
        Self { config }
    }

    /// Factorize historical performance. Too few users or tasks yields the
    /// degenerate metrics instead of an error; profiles are always built.
    #[instrument(skip_all, fields(records = records.len()))]
    pub fn fit(&self, records: &[InteractionRecord]) -> CollaborativeModel {
        let profiles = build_profiles(records);
        let users: BTreeSet<&str> = records.iter().map(|r| r.user_id.as_str()).collect();
        let tasks: BTreeSet<&str> = records.iter().map(|r| r.task_id.as_str()).collect();
        let (n_users, n_tasks) = (users.len(), tasks.len());

        if n_users < self.config.min_users || n_tasks < self.config.min_tasks {
            warn!(
                n_users,
                n_tasks,
                min_users = self.config.min_users,
                min_tasks = self.config.min_tasks,
                "not enough distinct users or tasks for collaborative filtering"
            );
            return CollaborativeModel {
                factorization: None,
                profiles,
                metrics: CollaborativeMetrics::degenerate(n_users, n_tasks),
            };
        }

        let user_ids: Vec<String> = users.iter().map(|s| s.to_string()).collect();
        let task_ids: Vec<String> = tasks.iter().map(|s| s.to_string()).collect();
        let user_pos: BTreeMap<&str, usize> = users.iter().enumerate().map(|(i, u)| (*u, i)).collect();
        let task_pos: BTreeMap<&str, usize> = tasks.iter().enumerate().map(|(i, t)| (*t, i)).collect();

        let matrix = interaction_matrix(records, &user_pos, &task_pos);

        let k = self.config.max_components.min(n_users.min(n_tasks) - 1);
        let Some(factorization) = truncated_svd(&matrix, k, user_ids, task_ids) else {
            warn!("SVD did not produce singular vectors; collaborative model degenerate");
            return CollaborativeModel {
                factorization: None,
                profiles,
                metrics: CollaborativeMetrics::degenerate(n_users, n_tasks),
            };
        };

        let metrics = fit_metrics(&matrix, &factorization);
        info!(
            rmse = metrics.rmse,
            coverage = metrics.coverage,
            components = metrics.n_components,
            explained_variance = metrics.explained_variance_ratio,
            "collaborative model trained"
        );
        CollaborativeModel {
            factorization: Some(factorization),
            profiles,
            metrics,
        }
    }
}

/// User x task performance. Repeated pairings average over their scored
/// records; unscored records are skipped and a pair with no score stays 0.
fn interaction_matrix(
    records: &[InteractionRecord],
    user_pos: &BTreeMap<&str, usize>,
    task_pos: &BTreeMap<&str, usize>,
) -> DMatrix<f64> {
    let mut cells: BTreeMap<(usize, usize), (f64, usize)> = BTreeMap::new();
    for r in records {
        let (Some(score), Some(&u), Some(&t)) = (
            r.performance_score,
            user_pos.get(r.user_id.as_str()),
            task_pos.get(r.task_id.as_str()),
        ) else {
            continue;
        };
        let cell = cells.entry((u, t)).or_insert((0.0, 0));
        cell.0 += sanitize_cell(score);
        cell.1 += 1;
    }

    let mut matrix = DMatrix::<f64>::zeros(user_pos.len(), task_pos.len());
    for ((u, t), (sum, count)) in cells {
        matrix[(u, t)] = sum / count as f64;
    }
    matrix
}

fn truncated_svd(matrix: &DMatrix<f64>, k: usize, user_ids: Vec<String>, task_ids: Vec<String>) -> Option<Factorization> {
    let svd = matrix.clone().svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let values = svd.singular_values;

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    order.truncate(k);

    let user_factors = (0..matrix.nrows())
        .map(|i| order.iter().map(|&c| u[(i, c)] * values[c]).collect())
        .collect();
    let components = order
        .iter()
        .map(|&c| (0..matrix.ncols()).map(|t| v_t[(c, t)]).collect())
        .collect();

    Some(Factorization {
        user_ids,
        task_ids,
        user_factors,
        components,
        singular_values: order.iter().map(|&c| values[c]).collect(),
    })
}

fn column_variance(values: impl Iterator<Item = f64> + Clone, n: f64) -> f64 {
    let mean = values.clone().sum::<f64>() / n;
    values.map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn fit_metrics(matrix: &DMatrix<f64>, factorization: &Factorization) -> CollaborativeMetrics {
    let (n_users, n_tasks) = matrix.shape();
    let n = n_users as f64;

    let mut squared_error = 0.0;
    let mut observed = 0usize;
    for u in 0..n_users {
        for t in 0..n_tasks {
            let actual = matrix[(u, t)];
            if actual == 0.0 {
                continue;
            }
            let predicted: f64 = factorization.user_factors[u]
                .iter()
                .zip(&factorization.components)
                .map(|(f, component)| f * component[t])
                .sum();
            squared_error += (actual - predicted).powi(2);
            observed += 1;
        }
    }
    let rmse = if observed > 0 {
        (squared_error / observed as f64).sqrt()
    } else {
        f64::INFINITY
    };

    let total_variance: f64 = (0..n_tasks)
        .map(|t| column_variance((0..n_users).map(|u| matrix[(u, t)]), n))
        .sum();
    let explained: f64 = (0..factorization.n_components())
        .map(|c| column_variance(factorization.user_factors.iter().map(|row| row[c]), n))
        .sum();

    CollaborativeMetrics {
        rmse,
        coverage: observed as f64 / (n_users * n_tasks) as f64,
        n_components: factorization.n_components(),
        explained_variance_ratio: if total_variance > 0.0 {
            explained / total_variance
        } else {
            0.0
        },
        n_users,
        n_tasks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: usize, task: usize, performance: Option<f64>) -> InteractionRecord {
        InteractionRecord {
            user_id: format!("u{user:02}"),
            task_id: format!("t{task:02}"),
            user_skills: vec!["Python".into()],
            department_name: Some("Engineering".into()),
            seniority_level: Some("sr".into()),
            performance_score: performance,
            ..InteractionRecord::default()
        }
    }

    #[test]
    fn five_by_five_is_degenerate() {
        let records: Vec<_> = (0..5)
            .flat_map(|u| (0..5).map(move |t| record(u, t, Some(0.7))))
            .collect();
        let model = CollaborativeTrainer::new(CollaborativeConfig::default()).fit(&records);
        assert!(model.factorization.is_none());
        assert_eq!(model.metrics.rmse, f64::INFINITY);
        assert_eq!(model.metrics.coverage, 0.0);
        assert_eq!(model.profiles.len(), 5);
    }

    #[test]
    fn sanitizes_non_finite_cells() {
        assert_eq!(sanitize_cell(f64::NAN), 0.0);
        assert_eq!(sanitize_cell(f64::INFINITY), 1.0);
        assert_eq!(sanitize_cell(f64::NEG_INFINITY), 0.0);
        assert_eq!(sanitize_cell(0.42), 0.42);
    }

    #[test]
    fn unscored_repeats_do_not_dilute_the_cell() {
        let records = vec![
            record(0, 0, Some(0.8)),
            record(0, 0, None),
            record(0, 1, None),
            record(1, 0, Some(0.4)),
            record(1, 0, Some(0.6)),
        ];
        let users: BTreeMap<&str, usize> = BTreeMap::from([("u00", 0), ("u01", 1)]);
        let tasks: BTreeMap<&str, usize> = BTreeMap::from([("t00", 0), ("t01", 1)]);

        let matrix = interaction_matrix(&records, &users, &tasks);
        assert_eq!(matrix.shape(), (2, 2));
        assert!((matrix[(0, 0)] - 0.8).abs() < 1e-12);
        assert_eq!(matrix[(0, 1)], 0.0);
        assert!((matrix[(1, 0)] - 0.5).abs() < 1e-12);
        assert_eq!(matrix[(1, 1)], 0.0);
    }

    #[test]
    fn low_rank_matrix_is_reconstructed() {
        let mut records = Vec::new();
        for u in 0..12 {
            for t in 0..12 {
                let value = (0.3 + 0.05 * u as f64) * (0.5 + 0.04 * t as f64);
                records.push(record(u, t, Some(value)));
            }
        }
        // duplicate pairing with a non-finite score: sanitized to 1.0, then averaged
        records.push(record(0, 0, Some(f64::INFINITY)));

        let model = CollaborativeTrainer::new(CollaborativeConfig::default()).fit(&records);
        let metrics = &model.metrics;
        assert_eq!(metrics.n_components, 11);
        assert!(metrics.rmse < 1e-6, "rmse {}", metrics.rmse);
        assert_eq!(metrics.coverage, 1.0);
        assert!((metrics.explained_variance_ratio - 1.0).abs() < 1e-6);

        let factorization = model.factorization.as_ref().unwrap();
        assert!(factorization.singular_values.windows(2).all(|w| w[0] >= w[1]));
        let expected = (0.3 * 0.5 + 1.0) / 2.0;
        assert!((factorization.predict("u00", "t00").unwrap() - expected).abs() < 1e-6);
        assert!(factorization.predict("nobody", "t01").is_none());
    }

    #[test]
    fn sparse_matrix_reports_coverage() {
        let mut records = Vec::new();
        for u in 0..12 {
            for t in 0..12 {
                let performance = if (u + t) % 3 == 0 { None } else { Some(0.2 + 0.05 * ((u * t) % 7) as f64) };
                records.push(record(u, t, performance));
            }
        }
        let model = CollaborativeTrainer::new(CollaborativeConfig::default()).fit(&records);
        let metrics = &model.metrics;
        assert!((metrics.coverage - 96.0 / 144.0).abs() < 1e-12);
        assert!(metrics.rmse.is_finite());
        assert!(metrics.explained_variance_ratio > 0.0 && metrics.explained_variance_ratio <= 1.0 + 1e-9);
    }

    #[test]
    fn profiles_aggregate_latest_attributes() {
        let mut records = vec![record(1, 1, Some(0.8)), record(1, 2, Some(0.6))];
        records[1].department_name = Some("data science".into());
        records.push(InteractionRecord {
            historical_performance: Some(0.3),
            ..record(2, 1, None)
        });
        records.push(record(3, 1, None));

        let profiles = build_profiles(&records);
        assert_eq!(profiles.len(), 2);
        assert!((profiles[0].mean_performance - 0.7).abs() < 1e-12);
        assert_eq!(profiles[0].department.as_deref(), Some("DATA_SCIENCE"));
        assert_eq!(profiles[0].seniority.as_deref(), Some("SENIOR"));
        assert_eq!(profiles[0].skills, vec!["python".to_string()]);
        assert_eq!(profiles[1].mean_performance, 0.3);
    }

    #[test]
    fn degenerate_metrics_serialize_rmse_as_null() {
        let json = serde_json::to_value(CollaborativeMetrics::degenerate(5, 5)).unwrap();
        assert!(json["rmse"].is_null());
        let back: CollaborativeMetrics = serde_json::from_value(json).unwrap();
        assert_eq!(back.rmse, f64::INFINITY);
    }
}
