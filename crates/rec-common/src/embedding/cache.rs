use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

static GLOBAL_CACHE: Lazy<Arc<EmbeddingCache>> = Lazy::new(|| Arc::new(EmbeddingCache::new()));

/// Process-wide cache shared by every matcher built from the environment.
pub fn global_cache() -> Arc<EmbeddingCache> {
    Arc::clone(&GLOBAL_CACHE)
}

/// Append-only map from normalized skill to embedding vector.
///
/// Reads take a shared lock. Concurrent misses may both compute the vector;
/// the first insert wins and the backend is deterministic, so both callers
/// observe the same value. Entries are never evicted.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, Arc<[f32]>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, skill: &str) -> Option<Arc<[f32]>> {
        self.entries.read().get(skill).cloned()
    }

    /// Insert unless present; returns the stored vector either way.
    pub fn insert(&self, skill: &str, vector: Vec<f32>) -> Arc<[f32]> {
        let mut entries = self.entries.write();
        Arc::clone(
            entries
                .entry(skill.to_string())
                .or_insert_with(|| Arc::from(vector)),
        )
    }

    /// Seed from a persisted snapshot without overwriting existing entries.
    pub fn warm(&self, snapshot: &BTreeMap<String, Vec<f32>>) -> usize {
        let mut entries = self.entries.write();
        let mut added = 0;
        for (skill, vector) in snapshot {
            if !entries.contains_key(skill) {
                entries.insert(skill.clone(), Arc::from(vector.clone()));
                added += 1;
            }
        }
        added
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<f32>> {
        self.entries
            .read()
            .iter()
            .map(|(skill, vector)| (skill.clone(), vector.to_vec()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
