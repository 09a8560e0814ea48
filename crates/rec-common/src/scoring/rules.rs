use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use crate::schema::Difficulty;
use crate::{Candidate, Task};

/// Business rules applied on top of the model score, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdjustmentRule {
    VeryLowPerformance,
    LowPerformance,
    VeryLowSuccessRate,
    LowSuccessRate,
    Overloaded,
    HighUtilization,
    LowCapacity,
    CriticalTaskUnderSenior,
    PressingTaskUnderSenior,
    BelowDifficultyMinimum,
    TopPerformer,
}

impl AdjustmentRule {
    pub fn factor(self) -> f64 {
        match self {
            AdjustmentRule::VeryLowPerformance => 0.3,
            AdjustmentRule::LowPerformance => 0.6,
            AdjustmentRule::VeryLowSuccessRate => 0.2,
            AdjustmentRule::LowSuccessRate => 0.5,
            AdjustmentRule::Overloaded => 0.1,
            AdjustmentRule::HighUtilization => 0.4,
            AdjustmentRule::LowCapacity => 0.5,
            AdjustmentRule::CriticalTaskUnderSenior => 0.3,
            AdjustmentRule::PressingTaskUnderSenior => 0.5,
            AdjustmentRule::BelowDifficultyMinimum => 0.6,
            AdjustmentRule::TopPerformer => 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// Product of every applied factor; 1.0 when nothing fired.
    pub multiplier: f64,
    pub applied: Vec<AdjustmentRule>,
}

impl RuleOutcome {
    pub fn apply(&self, score: f64) -> f64 {
        score * self.multiplier
    }
}

/// Evaluate the multiplier table for one candidate. Factors compound.
pub fn evaluate(candidate: &Candidate, task: &Task) -> RuleOutcome {
    let performance = candidate.performance();
    let success = candidate.success();
    let utilization = candidate.current_utilization();
    let seniority = candidate.seniority_rank();
    let difficulty = task.difficulty_level();
    let mut applied = Vec::new();

    if performance < 0.30 {
        applied.push(AdjustmentRule::VeryLowPerformance);
    } else if performance < 0.50 {
        applied.push(AdjustmentRule::LowPerformance);
    }

    if success < 0.20 {
        applied.push(AdjustmentRule::VeryLowSuccessRate);
    } else if success < 0.40 {
        applied.push(AdjustmentRule::LowSuccessRate);
    }

    if utilization >= 1.0 {
        applied.push(AdjustmentRule::Overloaded);
    } else if utilization >= 0.85 {
        applied.push(AdjustmentRule::HighUtilization);
    }

    if candidate.hours_available() < 0.5 * task.estimated_hours_or_default() {
        applied.push(AdjustmentRule::LowCapacity);
    }

    let pressing = task.priority_level().is_pressing();
    if pressing && difficulty == Difficulty::Hard && seniority < 3 {
        applied.push(AdjustmentRule::CriticalTaskUnderSenior);
    } else if pressing && difficulty == Difficulty::Medium && seniority < 2 {
        applied.push(AdjustmentRule::PressingTaskUnderSenior);
    }

    if seniority < difficulty.minimum_seniority() {
        applied.push(AdjustmentRule::BelowDifficultyMinimum);
    }

    if performance > 0.80 && success > 0.70 && utilization < 0.60 {
        applied.push(AdjustmentRule::TopPerformer);
    }

    RuleOutcome {
        multiplier: applied.iter().map(|rule| rule.factor()).product(),
        applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn easy_task() -> Task {
        Task {
            priority: Some("MEDIUM".into()),
            difficulty: Some("EASY".into()),
            estimated_hours: Some(10.0),
            ..Task::default()
        }
    }

    fn neutral_candidate() -> Candidate {
        Candidate {
            id: "c".into(),
            seniority_level: Some("SENIOR".into()),
            performance_score: Some(0.7),
            success_rate: Some(0.6),
            utilization: Some(0.5),
            available_capacity: Some(40.0),
            ..Candidate::default()
        }
    }

    #[test]
    fn neutral_candidate_is_untouched() {
        let outcome = evaluate(&neutral_candidate(), &easy_task());
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.multiplier, 1.0);
    }

    #[test]
    fn penalties_compound_in_order() {
        let candidate = Candidate {
            performance_score: Some(0.25),
            utilization: Some(1.0),
            ..neutral_candidate()
        };
        let outcome = evaluate(&candidate, &easy_task());
        assert_eq!(
            outcome.applied,
            vec![AdjustmentRule::VeryLowPerformance, AdjustmentRule::Overloaded]
        );
        assert!((outcome.multiplier - 0.03).abs() < 1e-12);
    }

    #[test]
    fn top_performer_is_boosted() {
        let candidate = Candidate {
            performance_score: Some(0.85),
            success_rate: Some(0.75),
            utilization: Some(0.40),
            ..neutral_candidate()
        };
        let outcome = evaluate(&candidate, &easy_task());
        assert_eq!(outcome.applied, vec![AdjustmentRule::TopPerformer]);
        assert!(outcome.apply(0.5) > 0.5);
    }

    #[test]
    fn seniority_rules_for_pressing_hard_work() {
        let task = Task {
            priority: Some("HIGH".into()),
            difficulty: Some("HARD".into()),
            estimated_hours: Some(10.0),
            ..Task::default()
        };
        let candidate = Candidate {
            seniority_level: Some("JUNIOR".into()),
            ..neutral_candidate()
        };
        let outcome = evaluate(&candidate, &task);
        assert_eq!(
            outcome.applied,
            vec![
                AdjustmentRule::CriticalTaskUnderSenior,
                AdjustmentRule::BelowDifficultyMinimum
            ]
        );
        assert!((outcome.multiplier - 0.18).abs() < 1e-12);
    }

    #[test]
    fn low_capacity_uses_half_the_estimate() {
        let candidate = Candidate {
            available_capacity: Some(4.0),
            ..neutral_candidate()
        };
        let outcome = evaluate(&candidate, &easy_task());
        assert_eq!(outcome.applied, vec![AdjustmentRule::LowCapacity]);
    }
}
