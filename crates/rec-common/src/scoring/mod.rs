pub mod collaborative;
pub mod engine;
pub mod explanation;
pub mod prefilter;
pub mod rules;
pub mod scorer;
pub mod weights;

pub use collaborative::{collaborative_score, CollaborativeLookup};
pub use engine::{RecommendationBatch, RecommendationEngine, RecommendationResult, DEFAULT_MAX_RECOMMENDATIONS};
pub use prefilter::{ExcludedCandidate, ExclusionReason, PrefilterThresholds};
pub use rules::{AdjustmentRule, RuleOutcome};
pub use scorer::{CandidateScore, CandidateScorer, HybridScorer, RuleBasedScorer, ScoringError};
pub use weights::{FallbackWeights, HybridWeights, FALLBACK_WEIGHTS};
