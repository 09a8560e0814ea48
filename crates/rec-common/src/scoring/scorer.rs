use std::sync::Arc;

use thiserror::Error;

use super::collaborative::collaborative_score;
use super::weights::{FallbackWeights, HybridWeights, FALLBACK_WEIGHTS};
use crate::artifact::ModelArtifact;
use crate::features::FeaturePipeline;
use crate::matching::SkillSemanticMatcher;
use crate::models::ModelError;
use crate::{Candidate, Task};

/// Contributors kept in a per-candidate breakdown.
pub const BREAKDOWN_SIZE: usize = 5;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Pre-adjustment score for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub content_score: Option<f64>,
    pub collaborative_score: Option<f64>,
    pub hybrid_score: f64,
    /// Overall skill match, reused by the explanation.
    pub skill_match: f64,
    pub feature_importance: Vec<(String, f64)>,
}

/// Scores candidates for a task before business rules are applied.
pub trait CandidateScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deployed model version, `None` for the rule-based scorer.
    fn model_version(&self) -> Option<&str>;

    fn is_fallback(&self) -> bool;

    /// One score per candidate, same order as `candidates`.
    fn score(&self, candidates: &[Candidate], task: &Task) -> Result<Vec<CandidateScore>, ScoringError>;
}

/// Normalize `(name, weight)` pairs to shares of their sum and keep the top
/// contributors.
fn top_shares(mut contributions: Vec<(String, f64)>) -> Vec<(String, f64)> {
    let total: f64 = contributions.iter().map(|(_, v)| v).sum();
    if total > 0.0 {
        for (_, v) in &mut contributions {
            *v /= total;
        }
    }
    contributions.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    contributions.truncate(BREAKDOWN_SIZE);
    contributions
}

/// Classifier probability blended with the collaborative lookup.
pub struct HybridScorer {
    artifact: Arc<ModelArtifact>,
    pipeline: FeaturePipeline,
    weights: HybridWeights,
}

impl HybridScorer {
    pub fn new(artifact: Arc<ModelArtifact>, matcher: Arc<SkillSemanticMatcher>, weights: HybridWeights) -> Self {
        Self {
            artifact,
            pipeline: FeaturePipeline::new(matcher),
            weights,
        }
    }

    /// Global importance times the magnitude of the standardized value.
    fn breakdown(&self, scaled_row: &[f64]) -> Vec<(String, f64)> {
        let contributions = self
            .artifact
            .feature_columns()
            .iter()
            .zip(scaled_row)
            .map(|(name, value)| (name.clone(), self.artifact.importance_of(name) * value.abs()))
            .filter(|(_, v)| *v > 0.0)
            .collect();
        top_shares(contributions)
    }
}

impl CandidateScorer for HybridScorer {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn model_version(&self) -> Option<&str> {
        Some(self.artifact.version())
    }

    fn is_fallback(&self) -> bool {
        false
    }

    fn score(&self, candidates: &[Candidate], task: &Task) -> Result<Vec<CandidateScore>, ScoringError> {
        let features = self
            .pipeline
            .build_prediction_features(candidates, task, &self.artifact.schema);
        let rows = features.matrix.rows();
        let content = self.artifact.classifier.predict_proba(rows)?;
        let scaled = self.artifact.classifier.scaler.transform(rows)?;
        let profiles = &self.artifact.collaborative.profiles;

        Ok(candidates
            .iter()
            .zip(content)
            .zip(&scaled)
            .zip(&features.skill_matches)
            .map(|(((candidate, content), scaled_row), skill_match)| {
                let collaborative = collaborative_score(candidate, profiles).score;
                CandidateScore {
                    content_score: Some(content),
                    collaborative_score: Some(collaborative),
                    hybrid_score: self.weights.combine(content, collaborative),
                    skill_match: skill_match.overall_score,
                    feature_importance: self.breakdown(scaled_row),
                }
            })
            .collect())
    }
}

/// Deterministic weighted formula over skill match, track record,
/// availability and experience.
pub struct RuleBasedScorer {
    matcher: Arc<SkillSemanticMatcher>,
    weights: FallbackWeights,
}

impl RuleBasedScorer {
    pub fn new(matcher: Arc<SkillSemanticMatcher>) -> Self {
        Self {
            matcher,
            weights: FALLBACK_WEIGHTS,
        }
    }

    fn score_one(&self, candidate: &Candidate, task: &Task) -> CandidateScore {
        let skill = self
            .matcher
            .match_skills(&candidate.skills, &task.required_skills)
            .overall_score;
        let track_record = (candidate.performance() + candidate.success()) / 2.0;
        let availability = (1.0 - candidate.current_utilization()).clamp(0.0, 1.0);
        let experience = (candidate.experience_years() / 10.0).min(1.0);

        let parts = [
            ("skill_match", self.weights.skill * skill),
            ("performance", self.weights.performance * track_record),
            ("availability", self.weights.availability * availability),
            ("experience", self.weights.experience * experience),
        ];
        CandidateScore {
            content_score: None,
            collaborative_score: None,
            hybrid_score: parts.iter().map(|(_, v)| v).sum(),
            skill_match: skill,
            feature_importance: top_shares(parts.iter().map(|(n, v)| (n.to_string(), *v)).collect()),
        }
    }
}

impl CandidateScorer for RuleBasedScorer {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn model_version(&self) -> Option<&str> {
        None
    }

    fn is_fallback(&self) -> bool {
        true
    }

    fn score(&self, candidates: &[Candidate], task: &Task) -> Result<Vec<CandidateScore>, ScoringError> {
        Ok(candidates.iter().map(|c| self.score_one(c, task)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::SkillMatchConfig;

    fn matcher() -> Arc<SkillSemanticMatcher> {
        Arc::new(SkillSemanticMatcher::exact_only(SkillMatchConfig::default()))
    }

    #[test]
    fn rule_based_formula() {
        let scorer = RuleBasedScorer::new(matcher());
        let task = Task {
            required_skills: vec!["Rust".into(), "SQL".into()],
            ..Task::default()
        };
        let candidate = Candidate {
            id: "c".into(),
            skills: vec!["rust".into()],
            performance_score: Some(0.8),
            success_rate: Some(0.6),
            utilization: Some(0.2),
            years_experience: Some(15.0),
            ..Candidate::default()
        };
        let scores = scorer.score(&[candidate], &task).unwrap();
        // skill 0.6*0.5 = 0.3 -> 0.105, track 0.7 -> 0.28, availability 0.8 -> 0.12, experience 1.0 -> 0.10
        assert!((scores[0].hybrid_score - 0.605).abs() < 1e-9);
        assert!(scores[0].content_score.is_none());
        let shares: f64 = scores[0].feature_importance.iter().map(|(_, v)| v).sum();
        assert!((shares - 1.0).abs() < 1e-9);
        assert_eq!(scores[0].feature_importance[0].0, "performance");
        assert!(scorer.is_fallback());
    }

    #[test]
    fn top_shares_keeps_five_largest() {
        let parts = (0..8).map(|i| (format!("f{i}"), f64::from(i))).collect();
        let top = top_shares(parts);
        assert_eq!(top.len(), BREAKDOWN_SIZE);
        assert_eq!(top[0].0, "f7");
        assert!((top[0].1 - 7.0 / 28.0).abs() < 1e-12);
    }
}
