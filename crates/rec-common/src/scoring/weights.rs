use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTENT_WEIGHT: f64 = 0.6;
pub const DEFAULT_COLLABORATIVE_WEIGHT: f64 = 0.4;

/// Blend of classifier probability and collaborative score. The two weights
/// are taken as configured and need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub content: f64,
    pub collaborative: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            content: DEFAULT_CONTENT_WEIGHT,
            collaborative: DEFAULT_COLLABORATIVE_WEIGHT,
        }
    }
}

impl HybridWeights {
    /// `REC_CONTENT_WEIGHT` / `REC_COLLABORATIVE_WEIGHT`; unparsable or
    /// negative values keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, default: f64| {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|w| w.is_finite() && *w >= 0.0)
                .unwrap_or(default)
        };
        Self {
            content: read("REC_CONTENT_WEIGHT", defaults.content),
            collaborative: read("REC_COLLABORATIVE_WEIGHT", defaults.collaborative),
        }
    }

    pub fn combine(&self, content: f64, collaborative: f64) -> f64 {
        self.content * content + self.collaborative * collaborative
    }
}

/// Rule-based scorer weights, used when no classifier is deployed.
pub const FALLBACK_WEIGHTS: FallbackWeights = FallbackWeights {
    skill: 0.35,
    performance: 0.40,
    availability: 0.15,
    experience: 0.10,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackWeights {
    pub skill: f64,
    pub performance: f64,
    pub availability: f64,
    pub experience: f64,
}

impl FallbackWeights {
    pub fn sum(&self) -> f64 {
        self.skill + self.performance + self.availability + self.experience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_weights_sum_to_one() {
        assert!((FALLBACK_WEIGHTS.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn default_blend() {
        let combined = HybridWeights::default().combine(0.8, 0.5);
        assert!((combined - 0.68).abs() < 1e-9);
    }

    #[test]
    fn weights_are_not_renormalized() {
        let weights = HybridWeights {
            content: 1.0,
            collaborative: 1.0,
        };
        assert!((weights.combine(0.7, 0.6) - 1.3).abs() < 1e-9);
    }
}
