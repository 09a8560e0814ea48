use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::AsRefStr;
use tracing::{info, warn};

use super::FeatureMatrix;
use crate::schema::InteractionRecord;

pub const PERFORMANCE_THRESHOLD: f64 = 0.6;
pub const SKILL_MATCH_THRESHOLD: f64 = 0.65;
/// Smallest class size the correction guarantees.
pub const MIN_MINORITY: usize = 3;
/// Features tried, in order, when synthesizing a second class.
pub const CORRECTION_FEATURES: [&str; 4] = [
    "estimated_hours",
    "years_experience",
    "priority_score",
    "complexity_score",
];
const CORRECTION_PERCENTILE: f64 = 90.0;

/// Which columns the binary target was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LabelPolicy {
    StatusAndPerformance,
    Performance,
    SkillMatch,
    Completion,
}

/// Pick the policy from column presence: a column counts as present when any
/// record carries it.
pub fn select_policy(records: &[InteractionRecord]) -> LabelPolicy {
    let has_status = records.iter().any(|r| r.task_status.is_some());
    let has_performance = records.iter().any(|r| r.performance_score.is_some());
    let has_skill_match = records.iter().any(|r| r.skill_match_score.is_some());

    match (has_status, has_performance, has_skill_match) {
        (true, true, _) => LabelPolicy::StatusAndPerformance,
        (_, true, _) => LabelPolicy::Performance,
        (_, _, true) => LabelPolicy::SkillMatch,
        _ => LabelPolicy::Completion,
    }
}

fn at_least(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v.is_finite() && v >= threshold)
}

pub fn derive_labels(records: &[InteractionRecord], policy: LabelPolicy) -> Vec<u8> {
    records
        .iter()
        .map(|r| {
            let positive = match policy {
                LabelPolicy::StatusAndPerformance => {
                    r.is_completed() && at_least(r.performance_score, PERFORMANCE_THRESHOLD)
                }
                LabelPolicy::Performance => at_least(r.performance_score, PERFORMANCE_THRESHOLD),
                LabelPolicy::SkillMatch => at_least(r.skill_match_score, SKILL_MATCH_THRESHOLD),
                LabelPolicy::Completion => r.is_completed(),
            };
            u8::from(positive)
        })
        .collect()
}

/// Rows flipped to give a single-class dataset a second class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCorrection {
    /// Feature whose upper tail was flipped; `None` for a random sample.
    pub feature: Option<String>,
    pub threshold: Option<f64>,
    pub original_class: u8,
    pub flipped_rows: Vec<usize>,
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

fn varies(values: &[f64]) -> bool {
    values
        .first()
        .is_some_and(|first| values.iter().any(|v| (v - first).abs() > f64::EPSILON))
}

fn upper_tail(values: &[f64], max_flips: usize) -> (f64, Vec<usize>) {
    let threshold = percentile(values, CORRECTION_PERCENTILE).unwrap_or(0.0);
    let mut selected: Vec<usize> = (0..values.len()).filter(|&i| values[i] >= threshold).collect();
    if selected.len() < MIN_MINORITY {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));
        order.truncate(MIN_MINORITY.min(max_flips));
        order.sort_unstable();
        selected = order;
    }
    (threshold, selected)
}

/// If every label is the same, flip a deterministic slice of rows so the
/// classifier sees two classes. Returns `None` when no correction was needed
/// or possible (fewer than two rows).
pub fn correct_degenerate_labels<R: Rng + ?Sized>(
    labels: &mut [u8],
    matrix: &FeatureMatrix,
    rng: &mut R,
) -> Option<LabelCorrection> {
    let n = labels.len();
    let original_class = *labels.first()?;
    if labels.iter().any(|&l| l != original_class) {
        return None;
    }
    if n < 2 {
        warn!(rows = n, "single-class labels cannot be corrected with fewer than two rows");
        return None;
    }
    let max_flips = n - 1;

    let mut chosen: Option<(String, f64, Vec<usize>)> = None;
    for name in CORRECTION_FEATURES {
        let Some(values) = matrix.column(name) else { continue };
        if !varies(&values) {
            continue;
        }
        let (threshold, rows) = upper_tail(&values, max_flips);
        if n - rows.len() >= MIN_MINORITY {
            chosen = Some((name.to_string(), threshold, rows));
        } else {
            warn!(feature = name, flips = rows.len(), rows = n, "upper tail would leave too few rows; sampling instead");
        }
        break;
    }

    let correction = match chosen {
        Some((feature, threshold, rows)) => LabelCorrection {
            feature: Some(feature),
            threshold: Some(threshold),
            original_class,
            flipped_rows: rows,
        },
        None => {
            let amount = MIN_MINORITY.max(n / 10).min(max_flips);
            let mut rows = rand::seq::index::sample(rng, n, amount).into_vec();
            rows.sort_unstable();
            LabelCorrection {
                feature: None,
                threshold: None,
                original_class,
                flipped_rows: rows,
            }
        }
    };

    for &row in &correction.flipped_rows {
        labels[row] = 1 - original_class;
    }
    info!(
        feature = correction.feature.as_deref().unwrap_or("random"),
        flipped = correction.flipped_rows.len(),
        rows = n,
        "single-class labels corrected"
    );
    Some(correction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn record(status: Option<&str>, performance: Option<f64>, skill_match: Option<f64>) -> InteractionRecord {
        InteractionRecord {
            user_id: "u".into(),
            task_id: "t".into(),
            task_status: status.map(str::to_string),
            performance_score: performance,
            skill_match_score: skill_match,
            ..InteractionRecord::default()
        }
    }

    fn matrix(columns: &[&str], rows: Vec<Vec<f64>>) -> FeatureMatrix {
        FeatureMatrix::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn policy_follows_column_presence() {
        let both = vec![record(Some("COMPLETED"), None, None), record(None, Some(0.7), None)];
        assert_eq!(select_policy(&both), LabelPolicy::StatusAndPerformance);
        assert_eq!(select_policy(&[record(None, Some(0.7), None)]), LabelPolicy::Performance);
        assert_eq!(select_policy(&[record(Some("X"), None, Some(0.7))]), LabelPolicy::SkillMatch);
        assert_eq!(select_policy(&[record(Some("X"), None, None)]), LabelPolicy::Completion);
    }

    #[test]
    fn status_and_performance_requires_both() {
        let records = vec![
            record(Some("COMPLETED"), Some(0.6), None),
            record(Some("COMPLETED"), Some(0.59), None),
            record(Some("CANCELLED"), Some(0.9), None),
            record(Some("COMPLETED"), None, None),
        ];
        assert_eq!(derive_labels(&records, LabelPolicy::StatusAndPerformance), vec![1, 0, 0, 0]);
        assert_eq!(derive_labels(&records, LabelPolicy::Performance), vec![1, 0, 1, 0]);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        assert!((percentile(&values, 90.0).unwrap() - 9.1).abs() < 1e-12);
        assert_eq!(percentile(&[5.0], 90.0), Some(5.0));
        assert_eq!(percentile(&[], 90.0), None);
    }

    #[test]
    fn single_class_is_corrected_from_upper_tail() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![5.0, f64::from(i)]).collect();
        let m = matrix(&["estimated_hours", "years_experience"], rows);
        let mut labels = vec![0u8; 20];
        let mut rng = StdRng::seed_from_u64(42);

        let correction = correct_degenerate_labels(&mut labels, &m, &mut rng).unwrap();
        assert_eq!(correction.feature.as_deref(), Some("years_experience"));
        assert_eq!(correction.flipped_rows, vec![17, 18, 19]);
        assert_eq!(labels.iter().filter(|&&l| l == 1).count(), 3);
    }

    #[test]
    fn constant_features_fall_back_to_random_sample() {
        let m = matrix(&["estimated_hours"], vec![vec![1.0]; 50]);
        let mut labels = vec![1u8; 50];
        let mut rng = StdRng::seed_from_u64(7);

        let correction = correct_degenerate_labels(&mut labels, &m, &mut rng).unwrap();
        assert!(correction.feature.is_none());
        assert_eq!(correction.flipped_rows.len(), 5);
        assert_eq!(labels.iter().filter(|&&l| l == 0).count(), 5);
    }

    #[test]
    fn two_class_labels_are_left_alone() {
        let m = matrix(&["estimated_hours"], vec![vec![1.0], vec![2.0]]);
        let mut labels = vec![0u8, 1];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(correct_degenerate_labels(&mut labels, &m, &mut rng).is_none());
        assert_eq!(labels, vec![0, 1]);
    }

    #[test]
    fn correction_is_deterministic_for_a_seed() {
        let m = matrix(&["estimated_hours"], vec![vec![1.0]; 40]);
        let run = |seed| {
            let mut labels = vec![0u8; 40];
            let mut rng = StdRng::seed_from_u64(seed);
            correct_degenerate_labels(&mut labels, &m, &mut rng).map(|c| c.flipped_rows)
        };
        assert_eq!(run(42), run(42));
    }
}
