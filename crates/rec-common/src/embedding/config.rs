#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Backend name understood by `create_embedder`.
    pub backend: String,
    /// Vector length; powers of two (256, 512) keep collisions predictable.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "hash".into(),
            dimension: 256,
        }
    }
}
