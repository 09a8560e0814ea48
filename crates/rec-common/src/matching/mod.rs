pub mod skills;

pub use skills::{SimilarSkillPair, SkillMatchConfig, SkillMatchResult, SkillSemanticMatcher};
