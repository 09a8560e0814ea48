use std::sync::Arc;

use parking_lot::RwLock;

use super::ModelArtifact;

/// The deployed artifact. Readers clone the `Arc` and keep scoring against
/// that snapshot while a deploy swaps in a replacement.
#[derive(Debug, Default)]
pub struct ActiveModel {
    current: RwLock<Option<Arc<ModelArtifact>>>,
}

impl ActiveModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(artifact: ModelArtifact) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(artifact))),
        }
    }

    pub fn get(&self) -> Option<Arc<ModelArtifact>> {
        self.current.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Install `artifact`, returning the one it replaced.
    pub fn swap(&self, artifact: Arc<ModelArtifact>) -> Option<Arc<ModelArtifact>> {
        self.current.write().replace(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::fixtures::tiny_artifact;

    #[test]
    fn readers_keep_their_snapshot_across_a_swap() {
        let active = ActiveModel::new();
        assert!(!active.is_loaded());

        active.swap(Arc::new(tiny_artifact("v1")));
        let held = active.get().unwrap();
        let previous = active.swap(Arc::new(tiny_artifact("v2"))).unwrap();

        assert_eq!(held.version(), "v1");
        assert_eq!(previous.version(), "v1");
        assert_eq!(active.get().unwrap().version(), "v2");
    }
}
