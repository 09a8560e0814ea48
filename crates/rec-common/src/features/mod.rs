pub mod encoders;
pub mod imputation;
pub mod labels;
pub mod pipeline;
pub mod text;

use serde::{Deserialize, Serialize};

pub use encoders::{CategoricalColumn, CategoricalEncoder, EncoderAuditEntry, EncoderSession, EncoderSet, LabelResolution};
pub use imputation::{ImputationStats, PreparedRecord};
pub use labels::{LabelCorrection, LabelPolicy};
pub use pipeline::{FeaturePipeline, FeatureSchema, PredictionFeatures, TrainingFeatures};
pub use text::TextVocabulary;

/// Fixed leading columns; fitted `tfidf_*` columns follow in vocabulary order.
pub const FEATURE_COLUMNS: &[&str] = &[
    "skill_match_count",
    "total_user_skills",
    "total_required_skills",
    "skill_match_ratio",
    "semantic_exact_score",
    "semantic_similarity_score",
    "semantic_overall_score",
    "years_experience",
    "experience_level",
    "priority_score",
    "difficulty_score",
    "complexity_score",
    "seniority_score",
    "estimated_hours",
    "utilization",
    "capacity",
    "available_capacity",
    "workload_pressure",
    "historical_performance",
    "success_rate",
    "time_efficiency",
    "time_variance",
    "assignment_day_of_week",
    "assignment_hour",
    "skill_seniority_interaction",
    "experience_per_complexity",
    "skill_depth",
    "difficulty_seniority_fit",
    "hours_per_required_skill",
    "priority_encoded",
    "difficulty_encoded",
    "department_encoded",
    "seniority_encoded",
];

/// Dense row-major feature table with named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Vec<f64>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// `(name, value)` pairs for one row, in column order.
    pub fn named_row(&self, row: usize) -> Vec<(&str, f64)> {
        self.rows
            .get(row)
            .map(|values| {
                self.columns
                    .iter()
                    .map(String::as_str)
                    .zip(values.iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().filter_map(|&i| self.rows.get(i).cloned()).collect(),
        }
    }
}
