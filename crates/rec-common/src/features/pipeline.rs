use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::encoders::{CategoricalColumn, EncoderAuditEntry, EncoderSession, EncoderSet};
use super::imputation::{ImputationStats, PreparedRecord};
use super::labels::{correct_degenerate_labels, derive_labels, select_policy, LabelCorrection, LabelPolicy};
use super::text::TextVocabulary;
use super::{FeatureMatrix, FEATURE_COLUMNS};
use crate::matching::{SkillMatchResult, SkillSemanticMatcher};
use crate::schema::{Difficulty, InteractionRecord, Priority, Seniority};
use crate::skill_normalizer::normalize_skill_set;
use crate::{Candidate, Task};

const DEFAULT_PRIORITY_SCORE: f64 = 2.0;
const DEFAULT_DIFFICULTY_SCORE: f64 = 2.0;
const DEFAULT_SENIORITY_SCORE: f64 = 3.0;

/// Everything prediction needs to reproduce the training-time features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub feature_columns: Vec<String>,
    pub imputation: ImputationStats,
    pub encoders: EncoderSet,
    #[serde(default)]
    pub text: TextVocabulary,
}

#[derive(Debug, Clone)]
pub struct TrainingFeatures {
    pub matrix: FeatureMatrix,
    pub labels: Vec<u8>,
    pub schema: FeatureSchema,
    pub label_policy: LabelPolicy,
    pub label_correction: Option<LabelCorrection>,
}

#[derive(Debug, Clone)]
pub struct PredictionFeatures {
    /// One row per candidate, columns exactly `schema.feature_columns`.
    pub matrix: FeatureMatrix,
    pub skill_matches: Vec<SkillMatchResult>,
    pub encoder_audit: Vec<EncoderAuditEntry>,
    /// Persisted columns this pipeline no longer derives; filled with 0.0.
    pub defaulted_columns: Vec<String>,
}

/// Raw records to model-ready numeric rows.
pub struct FeaturePipeline {
    matcher: Arc<SkillSemanticMatcher>,
    random_state: u64,
}

impl FeaturePipeline {
    pub fn new(matcher: Arc<SkillSemanticMatcher>) -> Self {
        Self {
            matcher,
            random_state: 42,
        }
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn matcher(&self) -> &Arc<SkillSemanticMatcher> {
        &self.matcher
    }

    /// Training features and labels. Imputation statistics and encoders are
    /// fit here and returned as the schema to persist. Single-class labels
    /// are corrected before anything downstream splits the data.
    #[instrument(skip_all, fields(records = records.len()))]
    pub fn build_features(&self, records: &[InteractionRecord]) -> TrainingFeatures {
        let imputation = ImputationStats::fit(records);
        let prepared: Vec<PreparedRecord> = records.iter().map(|r| imputation.apply(r)).collect();
        let encoders = EncoderSet::fit(&prepared);
        let documents: Vec<String> = prepared.iter().map(|r| r.text.clone()).collect();
        let text = TextVocabulary::fit(&documents);

        let mut columns: Vec<String> = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(text.columns());
        let mut matrix = FeatureMatrix::new(columns.clone());
        for row in &prepared {
            let skill_match = self.matcher.match_skills(&row.user_skills, &row.required_skills);
            let encoded = CategoricalColumn::ALL.map(|col| encoders.encode_known(col, col.value(row)));
            let mut values: Vec<f64> = derive_row(row, &skill_match, encoded)
                .into_iter()
                .map(|(_, v)| v)
                .collect();
            values.extend(text.transform(&row.text));
            matrix.push_row(values);
        }

        let label_policy = select_policy(records);
        let mut labels = derive_labels(records, label_policy);
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let label_correction = correct_degenerate_labels(&mut labels, &matrix, &mut rng);
        debug!(
            policy = label_policy.as_ref(),
            positives = labels.iter().filter(|&&l| l == 1).count(),
            rows = labels.len(),
            text_columns = text.selected.len(),
            "training features built"
        );

        TrainingFeatures {
            matrix,
            labels,
            schema: FeatureSchema {
                feature_columns: columns,
                imputation,
                encoders,
                text,
            },
            label_policy,
            label_correction,
        }
    }

    /// Candidate rows laid out exactly like `schema.feature_columns`.
    pub fn build_prediction_features(
        &self,
        candidates: &[Candidate],
        task: &Task,
        schema: &FeatureSchema,
    ) -> PredictionFeatures {
        let mut session = EncoderSession::new(&schema.encoders);
        let mut matrix = FeatureMatrix::new(schema.feature_columns.clone());
        let mut skill_matches = Vec::with_capacity(candidates.len());
        let mut defaulted: BTreeSet<String> = BTreeSet::new();
        let text_columns = schema.text.columns();

        for candidate in candidates {
            let record = InteractionRecord::for_prediction(candidate, task);
            let row = schema.imputation.apply_for_prediction(&record);
            let skill_match = self.matcher.match_skills(&row.user_skills, &row.required_skills);
            let encoded = CategoricalColumn::ALL.map(|col| session.encode(col, col.value(&row)));
            let mut derived: HashMap<String, f64> = derive_row(&row, &skill_match, encoded)
                .into_iter()
                .map(|(name, v)| (name.to_string(), v))
                .collect();
            derived.extend(text_columns.iter().cloned().zip(schema.text.transform(&row.text)));

            let values = schema
                .feature_columns
                .iter()
                .map(|name| match derived.get(name) {
                    Some(v) => *v,
                    None => {
                        defaulted.insert(name.clone());
                        0.0
                    }
                })
                .collect();
            matrix.push_row(values);
            skill_matches.push(skill_match);
        }

        if !defaulted.is_empty() {
            warn!(columns = ?defaulted, "persisted feature columns not derivable; defaulted to 0.0");
        }

        PredictionFeatures {
            matrix,
            skill_matches,
            encoder_audit: session.into_audit(),
            defaulted_columns: defaulted.into_iter().collect(),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    numerator / denominator.max(1.0)
}

/// Years of experience binned as junior (<= 2), mid (<= 5), senior (<= 10)
/// and expert.
fn experience_level(years: f64) -> f64 {
    match years {
        y if y <= 2.0 => 0.0,
        y if y <= 5.0 => 1.0,
        y if y <= 10.0 => 2.0,
        _ => 3.0,
    }
}

/// Derived features for one prepared row, in `FEATURE_COLUMNS` order.
fn derive_row(row: &PreparedRecord, skill_match: &SkillMatchResult, encoded: [f64; 4]) -> Vec<(&'static str, f64)> {
    let user_set = normalize_skill_set(&row.user_skills);
    let required_set = normalize_skill_set(&row.required_skills);
    let match_count = user_set.intersection(&required_set).count() as f64;
    let total_user = user_set.len() as f64;
    let total_required = required_set.len() as f64;
    let match_ratio = ratio(match_count, total_required);

    let priority = Priority::from_label(&row.priority).map_or(DEFAULT_PRIORITY_SCORE, Priority::weight);
    let difficulty = Difficulty::from_label(&row.difficulty).map_or(DEFAULT_DIFFICULTY_SCORE, Difficulty::weight);
    let complexity = priority * difficulty;
    let seniority = Seniority::from_label(&row.seniority)
        .map_or(DEFAULT_SENIORITY_SCORE, |s| f64::from(s.level()));

    let time_efficiency = match row.actual_hours {
        Some(actual) if actual > 0.0 => row.estimated_hours / actual,
        _ => 1.0,
    };
    let time_variance = row
        .actual_hours
        .map_or(0.0, |actual| (actual - row.estimated_hours).abs());
    let [priority_encoded, difficulty_encoded, department_encoded, seniority_encoded] = encoded;

    let values = vec![
        ("skill_match_count", match_count),
        ("total_user_skills", total_user),
        ("total_required_skills", total_required),
        ("skill_match_ratio", match_ratio),
        ("semantic_exact_score", skill_match.exact_score),
        ("semantic_similarity_score", skill_match.similarity_score),
        ("semantic_overall_score", skill_match.overall_score),
        ("years_experience", row.years_experience),
        ("experience_level", experience_level(row.years_experience)),
        ("priority_score", priority),
        ("difficulty_score", difficulty),
        ("complexity_score", complexity),
        ("seniority_score", seniority),
        ("estimated_hours", row.estimated_hours),
        ("utilization", row.utilization),
        ("capacity", row.capacity),
        ("available_capacity", row.capacity * (1.0 - row.utilization)),
        ("workload_pressure", row.utilization),
        ("historical_performance", row.historical_performance),
        ("success_rate", row.success_rate),
        ("time_efficiency", time_efficiency),
        ("time_variance", time_variance),
        ("assignment_day_of_week", row.assignment_day_of_week),
        ("assignment_hour", row.assignment_hour),
        ("skill_seniority_interaction", total_user * seniority),
        ("experience_per_complexity", ratio(row.years_experience, complexity)),
        ("skill_depth", total_user * match_ratio),
        ("difficulty_seniority_fit", ratio(difficulty, seniority)),
        ("hours_per_required_skill", ratio(row.estimated_hours, total_required)),
        ("priority_encoded", priority_encoded),
        ("difficulty_encoded", difficulty_encoded),
        ("department_encoded", department_encoded),
        ("seniority_encoded", seniority_encoded),
    ];
    debug_assert_eq!(values.len(), FEATURE_COLUMNS.len());
    values
}
