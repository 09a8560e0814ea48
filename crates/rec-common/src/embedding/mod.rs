pub mod cache;
pub mod config;
pub mod hash_embedder;
pub mod similarity;

use std::sync::Arc;

pub use cache::{global_cache, EmbeddingCache};
pub use config::EmbeddingConfig;
pub use hash_embedder::HashSkillEmbedder;
pub use similarity::cosine_similarity;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("cannot embed an empty skill label")]
    EmptyInput,
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
}

/// Skill embedding backend.
///
/// Implementations must be deterministic per (`name`, `version`): the cached
/// vectors are persisted with the model artifact and reused across processes.
pub trait SkillEmbedder: Send + Sync {
    /// Backend name ("hash").
    fn name(&self) -> &'static str;

    /// Bump whenever tokenization or hashing changes.
    fn version(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed one already-normalized skill label.
    fn embed(&self, skill: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// `name:version`, stamped on persisted caches.
    fn identity(&self) -> String {
        format!("{}:{}", self.name(), self.version())
    }
}

/// Backend factory. `none`/`off` disables embeddings (exact matching only);
/// unknown names fall back to the hash backend.
pub fn create_embedder(name: &str, config: EmbeddingConfig) -> Option<Arc<dyn SkillEmbedder>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "hash" | "" => Some(Arc::new(HashSkillEmbedder::new(config))),
        "none" | "off" | "disabled" => None,
        other => {
            warn!(backend = other, "unknown skill embedder; using hash backend");
            Some(Arc::new(HashSkillEmbedder::new(config)))
        }
    }
}

pub fn load_config_from_env() -> EmbeddingConfig {
    let defaults = EmbeddingConfig::default();
    EmbeddingConfig {
        backend: std::env::var("REC_SKILL_EMBEDDER").unwrap_or(defaults.backend),
        dimension: std::env::var("REC_SKILL_EMBEDDING_DIM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.dimension),
    }
}

/// Embedder selected by the environment.
pub fn embedder_from_env() -> Option<Arc<dyn SkillEmbedder>> {
    let config = load_config_from_env();
    let backend = config.backend.clone();
    create_embedder(&backend, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_honours_disabled_backend() {
        assert!(create_embedder("none", EmbeddingConfig::default()).is_none());
        assert!(create_embedder("OFF", EmbeddingConfig::default()).is_none());
    }

    #[test]
    fn factory_falls_back_to_hash() {
        let embedder = create_embedder("word2vec", EmbeddingConfig::default());
        let embedder = embedder.expect("hash fallback");
        assert_eq!(embedder.name(), "hash");
        assert_eq!(embedder.dimension(), 256);
        assert!(embedder.identity().starts_with("hash:"));
    }
}
