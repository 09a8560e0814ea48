use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::embedding::{
    cosine_similarity, embedder_from_env, global_cache, EmbeddingCache, EmbeddingError,
    SkillEmbedder,
};
use crate::skill_normalizer::normalize_skills_vec;

pub const DEFAULT_EXACT_WEIGHT: f64 = 0.6;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkillMatchConfig {
    pub exact_weight: f64,
    pub similarity_threshold: f64,
}

impl Default for SkillMatchConfig {
    fn default() -> Self {
        Self {
            exact_weight: DEFAULT_EXACT_WEIGHT,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarSkillPair {
    pub required: String,
    pub user_has: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMatchResult {
    pub exact_score: f64,
    pub similarity_score: f64,
    pub overall_score: f64,
    pub matched_skills: Vec<String>,
    pub similar_pairs: Vec<SimilarSkillPair>,
    /// True when the embedding backend was unavailable and only exact
    /// matches counted.
    pub exact_only: bool,
}

impl SkillMatchResult {
    fn uniform(score: f64) -> Self {
        Self {
            exact_score: score,
            similarity_score: score,
            overall_score: score,
            matched_skills: Vec::new(),
            similar_pairs: Vec::new(),
            exact_only: false,
        }
    }
}

/// Exact plus embedding-similarity skill overlap.
pub struct SkillSemanticMatcher {
    embedder: Option<Arc<dyn SkillEmbedder>>,
    cache: Arc<EmbeddingCache>,
    config: SkillMatchConfig,
}

impl SkillSemanticMatcher {
    pub fn new(
        embedder: Option<Arc<dyn SkillEmbedder>>,
        cache: Arc<EmbeddingCache>,
        config: SkillMatchConfig,
    ) -> Self {
        Self {
            embedder,
            cache,
            config,
        }
    }

    /// Matcher backed by the environment-selected embedder and the
    /// process-wide cache.
    pub fn from_env() -> Self {
        Self::new(embedder_from_env(), global_cache(), SkillMatchConfig::default())
    }

    /// Exact matching only, e.g. when no embedding backend is configured.
    pub fn exact_only(config: SkillMatchConfig) -> Self {
        Self::new(None, Arc::new(EmbeddingCache::new()), config)
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// `name:version` of the embedding backend, if any.
    pub fn embedder_identity(&self) -> Option<String> {
        self.embedder.as_ref().map(|e| e.identity())
    }

    pub fn match_skills(&self, user_skills: &[String], required_skills: &[String]) -> SkillMatchResult {
        self.match_skills_with(
            user_skills,
            required_skills,
            self.config.exact_weight,
            self.config.similarity_threshold,
        )
    }

    pub fn match_skills_with(
        &self,
        user_skills: &[String],
        required_skills: &[String],
        exact_weight: f64,
        similarity_threshold: f64,
    ) -> SkillMatchResult {
        let required = normalize_skills_vec(required_skills);
        if required.is_empty() {
            return SkillMatchResult::uniform(1.0);
        }
        let user = normalize_skills_vec(user_skills);
        if user.is_empty() {
            return SkillMatchResult::uniform(0.0);
        }

        let user_set: HashSet<&str> = user.iter().map(String::as_str).collect();
        let (matched, unmatched): (Vec<&String>, Vec<&String>) = required
            .iter()
            .partition(|skill| user_set.contains(skill.as_str()));
        let exact_score = matched.len() as f64 / required.len() as f64;

        let (similar_pairs, exact_only) = match self.similar_pairs(&user, &unmatched, similarity_threshold) {
            Ok(pairs) => (pairs, false),
            Err(_) if self.embedder.is_none() => (Vec::new(), true),
            Err(err) => {
                warn!(error = %err, "skill embeddings unavailable; exact matching only");
                (Vec::new(), true)
            }
        };
        let similarity_score =
            similar_pairs.iter().map(|p| p.similarity).sum::<f64>() / required.len() as f64;

        SkillMatchResult {
            exact_score,
            similarity_score,
            overall_score: exact_weight * exact_score + (1.0 - exact_weight) * similarity_score,
            matched_skills: matched.into_iter().cloned().collect(),
            similar_pairs,
            exact_only,
        }
    }

    fn similar_pairs(
        &self,
        user: &[String],
        unmatched: &[&String],
        threshold: f64,
    ) -> Result<Vec<SimilarSkillPair>, EmbeddingError> {
        if unmatched.is_empty() {
            return Ok(Vec::new());
        }
        let user_vectors = user
            .iter()
            .map(|skill| self.embedding(skill).map(|v| (skill, v)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut pairs = Vec::new();
        for required in unmatched {
            let required_vector = self.embedding(required)?;
            let mut best: Option<(&String, f64)> = None;
            for (skill, vector) in &user_vectors {
                let sim = f64::from(cosine_similarity(&required_vector, vector));
                if best.map_or(true, |(_, top)| sim > top) {
                    best = Some((*skill, sim));
                }
            }
            if let Some((skill, sim)) = best.filter(|(_, sim)| *sim >= threshold) {
                pairs.push(SimilarSkillPair {
                    required: (*required).clone(),
                    user_has: skill.clone(),
                    similarity: sim,
                });
            }
        }
        Ok(pairs)
    }

    fn embedding(&self, skill: &str) -> Result<Arc<[f32]>, EmbeddingError> {
        if let Some(hit) = self.cache.get(skill) {
            return Ok(hit);
        }
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| EmbeddingError::Unavailable("no embedder configured".into()))?;
        let vector = embedder.embed(skill)?;
        Ok(self.cache.insert(skill, vector))
    }
}
