use super::{EmbeddingConfig, EmbeddingError, SkillEmbedder};
use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};

/// Fixed seeds. Changing them changes every vector: bump `version()` too.
const HASH_SEED_K0: u64 = 0x0123_4567_89ab_cdef;
const HASH_SEED_K1: u64 = 0xfedc_ba98_7654_3210;

const LABEL_WEIGHT: f32 = 1.0;
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
struct WeightedToken {
    token: String,
    weight: f32,
}

/// Feature-hashing skill embedder.
///
/// Tokens: the whole label, its alphanumeric words, and character trigrams of
/// the compacted label, so spelling variants ("react" / "react.js") land close
/// while unrelated labels stay near orthogonal. Sign hashing keeps collisions
/// unbiased; the output is L2-normalized.
pub struct HashSkillEmbedder {
    dimension: usize,
}

impl HashSkillEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            dimension: config.dimension.max(1),
        }
    }

    fn hash(&self, token: &str) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        token.hash(&mut hasher);
        hasher.finish()
    }

    fn tokenize(skill: &str) -> Vec<WeightedToken> {
        let mut tokens = vec![WeightedToken {
            token: format!("label:{skill}"),
            weight: LABEL_WEIGHT,
        }];

        for word in skill
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            tokens.push(WeightedToken {
                token: format!("word:{word}"),
                weight: WORD_WEIGHT,
            });
        }

        let compact: Vec<char> = std::iter::once('^')
            .chain(skill.chars().filter(|c| c.is_alphanumeric()))
            .chain(std::iter::once('$'))
            .collect();
        for window in compact.windows(3) {
            tokens.push(WeightedToken {
                token: format!("tri:{}", window.iter().collect::<String>()),
                weight: TRIGRAM_WEIGHT,
            });
        }

        tokens
    }
}

impl SkillEmbedder for HashSkillEmbedder {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn version(&self) -> &str {
        "skill-v1"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, skill: &str) -> Result<Vec<f32>, EmbeddingError> {
        if skill.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimension];
        for wt in Self::tokenize(skill) {
            let idx = (self.hash(&wt.token) % self.dimension as u64) as usize;
            let sign = if self.hash(&format!("{}#sign", wt.token)) % 2 == 0 {
                1.0
            } else {
                -1.0
            };
            vector[idx] += sign * wt.weight;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}
