use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::explanation::{explain, ExplanationInput};
use super::prefilter::{partition, ExcludedCandidate};
use super::rules::{evaluate, AdjustmentRule};
use super::scorer::{CandidateScore, CandidateScorer, HybridScorer, RuleBasedScorer};
use super::weights::HybridWeights;
use crate::artifact::ModelArtifact;
use crate::matching::SkillSemanticMatcher;
use crate::{Candidate, Task};

pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub candidate_id: String,
    pub candidate_name: Option<String>,
    /// 1-based.
    pub rank: usize,
    pub content_score: Option<f64>,
    pub collaborative_score: Option<f64>,
    pub hybrid_score: f64,
    pub multiplier: f64,
    pub adjusted_score: f64,
    /// Adjusted score min-max normalized across the batch.
    pub final_score: f64,
    pub applied_rules: Vec<AdjustmentRule>,
    pub feature_importance: Vec<(String, f64)>,
    pub explanation: String,
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationBatch {
    pub task_id: Option<String>,
    pub model_version: Option<String>,
    pub fallback: bool,
    pub results: Vec<RecommendationResult>,
    pub excluded: Vec<ExcludedCandidate>,
}

/// Performance scores on a 0..100 scale are brought to 0..1 for the whole
/// batch when any candidate exceeds 1.0.
pub fn rescale_performance(candidates: &[Candidate]) -> Vec<Candidate> {
    let max = candidates
        .iter()
        .filter_map(|c| c.performance_score.filter(|v| v.is_finite()))
        .fold(f64::NEG_INFINITY, f64::max);
    let mut out = candidates.to_vec();
    if max > 1.0 {
        info!(max_performance = max, "rescaling performance scores from 0-100 to 0-1");
        for candidate in &mut out {
            candidate.performance_score = candidate.performance_score.map(|v| v / 100.0);
        }
    }
    out
}

/// Min-max normalize in place; left unchanged when every value is equal.
pub fn min_max_normalize(values: &mut [f64]) {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return;
    }
    for v in values.iter_mut() {
        *v = (*v - min) / range;
    }
}

/// Pre-filter, score, adjust, normalize and rank.
pub struct RecommendationEngine {
    matcher: Arc<SkillSemanticMatcher>,
    weights: HybridWeights,
}

impl RecommendationEngine {
    pub fn new(matcher: Arc<SkillSemanticMatcher>, weights: HybridWeights) -> Self {
        Self { matcher, weights }
    }

    pub fn matcher(&self) -> &Arc<SkillSemanticMatcher> {
        &self.matcher
    }

    /// Hybrid scorer when a model is deployed, rule-based otherwise.
    pub fn scorer_for(&self, artifact: Option<Arc<ModelArtifact>>) -> Box<dyn CandidateScorer> {
        match artifact {
            Some(artifact) => Box::new(HybridScorer::new(artifact, Arc::clone(&self.matcher), self.weights)),
            None => Box::new(RuleBasedScorer::new(Arc::clone(&self.matcher))),
        }
    }

    #[instrument(skip_all, fields(task_id = ?task.id, candidates = candidates.len()))]
    pub fn recommend(
        &self,
        artifact: Option<Arc<ModelArtifact>>,
        task: &Task,
        candidates: &[Candidate],
        max_recommendations: usize,
    ) -> RecommendationBatch {
        let candidates = rescale_performance(candidates);
        let (passed, excluded) = partition(&candidates, task);
        for exclusion in &excluded {
            let reasons: Vec<String> = exclusion.reasons.iter().map(ToString::to_string).collect();
            debug!(candidate_id = %exclusion.candidate_id, ?reasons, "candidate excluded by pre-filter");
        }
        info!(passed = passed.len(), excluded = excluded.len(), "pre-filter applied");

        let eligible: Vec<Candidate> = passed.iter().map(|&i| candidates[i].clone()).collect();
        if eligible.is_empty() {
            warn!("no suitable candidates after pre-filtering");
            return RecommendationBatch {
                task_id: task.id.clone(),
                model_version: artifact.as_ref().map(|a| a.version().to_string()),
                fallback: artifact.is_none(),
                results: Vec::new(),
                excluded,
            };
        }

        let scorer = self.scorer_for(artifact);
        let (scores, scorer) = match scorer.score(&eligible, task) {
            Ok(scores) => (scores, scorer),
            Err(err) => {
                error!(error = %err, scorer = scorer.name(), "scoring failed; using rule-based fallback");
                let fallback = self.scorer_for(None);
                let scores = fallback.score(&eligible, task).unwrap_or_default();
                (scores, fallback)
            }
        };
        if scorer.is_fallback() {
            metrics::counter!("rec_fallback_scoring_total").increment(1);
            warn!("no deployed model; ranking with the rule-based scorer");
        }

        let mut results = self.assemble(&eligible, task, scores, scorer.is_fallback());
        results.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.hybrid_score.partial_cmp(&a.hybrid_score).unwrap_or(Ordering::Equal))
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        results.truncate(max_recommendations);
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }

        RecommendationBatch {
            task_id: task.id.clone(),
            model_version: scorer.model_version().map(str::to_string),
            fallback: scorer.is_fallback(),
            results,
            excluded,
        }
    }

    fn assemble(
        &self,
        eligible: &[Candidate],
        task: &Task,
        scores: Vec<CandidateScore>,
        fallback: bool,
    ) -> Vec<RecommendationResult> {
        let outcomes: Vec<_> = eligible.iter().map(|c| evaluate(c, task)).collect();
        let adjusted: Vec<f64> = scores
            .iter()
            .zip(&outcomes)
            .map(|(score, outcome)| outcome.apply(score.hybrid_score))
            .collect();
        let mut normalized = adjusted.clone();
        min_max_normalize(&mut normalized);

        eligible
            .iter()
            .zip(scores)
            .zip(outcomes)
            .zip(adjusted.into_iter().zip(normalized))
            .map(|(((candidate, score), outcome), (adjusted_score, final_score))| {
                let explanation = explain(&ExplanationInput {
                    confidence: adjusted_score,
                    importance: &score.feature_importance,
                    skill_match: score.skill_match,
                    performance: candidate.performance(),
                    utilization: candidate.current_utilization(),
                });
                RecommendationResult {
                    candidate_id: candidate.id.clone(),
                    candidate_name: candidate.name.clone(),
                    rank: 0,
                    content_score: score.content_score,
                    collaborative_score: score.collaborative_score,
                    hybrid_score: score.hybrid_score,
                    multiplier: outcome.multiplier,
                    adjusted_score,
                    final_score,
                    applied_rules: outcome.applied,
                    feature_importance: score.feature_importance,
                    explanation,
                    fallback,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::SkillMatchConfig;

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(
            Arc::new(SkillSemanticMatcher::exact_only(SkillMatchConfig::default())),
            HybridWeights::default(),
        )
    }

    fn candidate(id: &str, performance: f64, skills: &[&str]) -> Candidate {
        Candidate {
            id: id.into(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            seniority_level: Some("SENIOR".into()),
            performance_score: Some(performance),
            success_rate: Some(0.6),
            utilization: Some(0.5),
            available_capacity: Some(40.0),
            years_experience: Some(5.0),
            ..Candidate::default()
        }
    }

    #[test]
    fn normalization_handles_flat_batches() {
        let mut flat = vec![0.4, 0.4];
        min_max_normalize(&mut flat);
        assert_eq!(flat, vec![0.4, 0.4]);

        let mut spread = vec![0.2, 0.6, 0.4];
        min_max_normalize(&mut spread);
        assert_eq!(spread[0], 0.0);
        assert_eq!(spread[1], 1.0);
        assert!((spread[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn percentage_scores_are_rescaled() {
        let rescaled = rescale_performance(&[candidate("a", 85.0, &[]), candidate("b", 0.9, &[])]);
        assert!((rescaled[0].performance_score.unwrap() - 0.85).abs() < 1e-12);
        assert!((rescaled[1].performance_score.unwrap() - 0.009).abs() < 1e-12);

        let untouched = rescale_performance(&[candidate("a", 0.85, &[])]);
        assert_eq!(untouched[0].performance_score, Some(0.85));
    }

    #[test]
    fn fallback_ranking_without_a_model() {
        let task = Task {
            id: Some("t1".into()),
            required_skills: vec!["rust".into()],
            ..Task::default()
        };
        let candidates = vec![
            candidate("weak", 0.45, &[]),
            candidate("strong", 0.75, &["Rust"]),
            candidate("excluded", 0.1, &["Rust"]),
        ];
        let batch = engine().recommend(None, &task, &candidates, 10);

        assert!(batch.fallback);
        assert!(batch.model_version.is_none());
        assert_eq!(batch.excluded.len(), 1);
        assert_eq!(batch.excluded[0].candidate_id, "excluded");
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.results[0].candidate_id, "strong");
        assert_eq!(batch.results[0].rank, 1);
        assert_eq!(batch.results[0].final_score, 1.0);
        assert_eq!(batch.results[1].final_score, 0.0);
        assert_eq!(batch.results[1].applied_rules, vec![AdjustmentRule::LowPerformance]);
        assert!(batch.results.iter().all(|r| r.fallback));
    }

    #[test]
    fn results_are_truncated() {
        let candidates: Vec<_> = (0..5)
            .map(|i| candidate(&format!("c{i}"), 0.5 + 0.05 * f64::from(i), &[]))
            .collect();
        let batch = engine().recommend(None, &Task::default(), &candidates, 3);
        assert_eq!(batch.results.len(), 3);
        assert_eq!(
            batch.results.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(batch.results[0].candidate_id, "c4");
    }
}
