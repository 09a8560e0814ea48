use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{Difficulty, Priority, Seniority};
use crate::{Candidate, Task};

/// Share of the task estimate a candidate must have free for HIGH/URGENT work.
pub const PRESSING_CAPACITY_SHARE: f64 = 0.3;

/// Minimum bar a candidate must clear before being scored at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrefilterThresholds {
    pub min_performance: f64,
    pub min_success_rate: f64,
    pub max_utilization: f64,
    pub min_seniority: Seniority,
}

impl PrefilterThresholds {
    pub fn for_task(priority: Priority, difficulty: Difficulty) -> Self {
        let (min_performance, min_success_rate, max_utilization, min_seniority) =
            match (priority.is_pressing(), difficulty) {
                (true, Difficulty::Hard) => (0.40, 0.30, 0.95, Seniority::MidLevel),
                (true, _) => (0.30, 0.25, 0.95, Seniority::Junior),
                (false, Difficulty::Hard) => (0.35, 0.25, 0.95, Seniority::MidLevel),
                (false, _) => (0.20, 0.15, 1.00, Seniority::Intern),
            };
        Self {
            min_performance,
            min_success_rate,
            max_utilization,
            min_seniority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    LowPerformance { actual: f64, minimum: f64 },
    LowSuccessRate { actual: f64, minimum: f64 },
    OverUtilized { actual: f64, maximum: f64 },
    InsufficientSeniority { actual: u8, minimum: Seniority },
    InsufficientCapacity { available: f64, required: f64 },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowPerformance { actual, minimum } => {
                write!(f, "Low performance ({:.1}% < {:.0}%)", actual * 100.0, minimum * 100.0)
            }
            Self::LowSuccessRate { actual, minimum } => {
                write!(f, "Low success rate ({:.1}% < {:.0}%)", actual * 100.0, minimum * 100.0)
            }
            Self::OverUtilized { actual, maximum } => {
                write!(f, "Over-utilized ({:.1}% > {:.0}%)", actual * 100.0, maximum * 100.0)
            }
            Self::InsufficientSeniority { actual, minimum } => {
                write!(f, "Insufficient seniority (level {actual} < {})", minimum.as_ref())
            }
            Self::InsufficientCapacity { available, required } => {
                write!(f, "Insufficient capacity ({available:.1}h < {required:.1}h)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    pub candidate_id: String,
    pub candidate_name: Option<String>,
    pub reasons: Vec<ExclusionReason>,
}

/// Every threshold the candidate fails; empty means it passes.
pub fn check_candidate(candidate: &Candidate, task: &Task, thresholds: &PrefilterThresholds) -> Vec<ExclusionReason> {
    let mut reasons = Vec::new();

    let performance = candidate.performance();
    if performance < thresholds.min_performance {
        reasons.push(ExclusionReason::LowPerformance {
            actual: performance,
            minimum: thresholds.min_performance,
        });
    }
    let success = candidate.success();
    if success < thresholds.min_success_rate {
        reasons.push(ExclusionReason::LowSuccessRate {
            actual: success,
            minimum: thresholds.min_success_rate,
        });
    }
    let utilization = candidate.current_utilization();
    if utilization > thresholds.max_utilization {
        reasons.push(ExclusionReason::OverUtilized {
            actual: utilization,
            maximum: thresholds.max_utilization,
        });
    }
    let seniority = candidate.seniority_rank();
    if seniority < thresholds.min_seniority.level() {
        reasons.push(ExclusionReason::InsufficientSeniority {
            actual: seniority,
            minimum: thresholds.min_seniority,
        });
    }
    if task.priority_level().is_pressing() {
        let available = candidate.hours_available();
        let required = task.estimated_hours_or_default() * PRESSING_CAPACITY_SHARE;
        if available < required {
            reasons.push(ExclusionReason::InsufficientCapacity { available, required });
        }
    }
    reasons
}

/// Split candidates into those that pass (by index) and those excluded.
pub fn partition(candidates: &[Candidate], task: &Task) -> (Vec<usize>, Vec<ExcludedCandidate>) {
    let thresholds = PrefilterThresholds::for_task(task.priority_level(), task.difficulty_level());
    let mut passed = Vec::with_capacity(candidates.len());
    let mut excluded = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let reasons = check_candidate(candidate, task, &thresholds);
        if reasons.is_empty() {
            passed.push(index);
        } else {
            excluded.push(ExcludedCandidate {
                candidate_id: candidate.id.clone(),
                candidate_name: candidate.name.clone(),
                reasons,
            });
        }
    }
    (passed, excluded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urgent_hard_task() -> Task {
        Task {
            priority: Some("URGENT".into()),
            difficulty: Some("HARD".into()),
            estimated_hours: Some(40.0),
            ..Task::default()
        }
    }

    fn solid_candidate(seniority: &str) -> Candidate {
        Candidate {
            id: "c1".into(),
            seniority_level: Some(seniority.into()),
            performance_score: Some(0.8),
            success_rate: Some(0.8),
            utilization: Some(0.3),
            available_capacity: Some(30.0),
            ..Candidate::default()
        }
    }

    #[test]
    fn threshold_profiles() {
        let critical = PrefilterThresholds::for_task(Priority::Urgent, Difficulty::Hard);
        assert_eq!(critical.min_performance, 0.40);
        assert_eq!(critical.min_seniority, Seniority::MidLevel);

        let pressing = PrefilterThresholds::for_task(Priority::High, Difficulty::Easy);
        assert_eq!(pressing.min_success_rate, 0.25);
        assert_eq!(pressing.min_seniority, Seniority::Junior);

        let hard = PrefilterThresholds::for_task(Priority::Low, Difficulty::Hard);
        assert_eq!(hard.min_performance, 0.35);

        let regular = PrefilterThresholds::for_task(Priority::Medium, Difficulty::Medium);
        assert_eq!(regular.max_utilization, 1.0);
        assert_eq!(regular.min_seniority, Seniority::Intern);
    }

    #[test]
    fn junior_is_rejected_for_urgent_hard_work() {
        let (passed, excluded) = partition(&[solid_candidate("JUNIOR")], &urgent_hard_task());
        assert!(passed.is_empty());
        assert_eq!(
            excluded[0].reasons,
            vec![ExclusionReason::InsufficientSeniority {
                actual: 2,
                minimum: Seniority::MidLevel
            }]
        );
        assert!(excluded[0].reasons[0].to_string().contains("MID_LEVEL"));
    }

    #[test]
    fn pressing_tasks_require_free_capacity() {
        let mut candidate = solid_candidate("SENIOR");
        candidate.available_capacity = Some(11.0);
        let thresholds = PrefilterThresholds::for_task(Priority::Urgent, Difficulty::Hard);
        let reasons = check_candidate(&candidate, &urgent_hard_task(), &thresholds);
        assert!(matches!(reasons.as_slice(), [ExclusionReason::InsufficientCapacity { .. }]));

        candidate.available_capacity = Some(12.5);
        assert!(check_candidate(&candidate, &urgent_hard_task(), &thresholds).is_empty());
    }

    #[test]
    fn utilization_limit_is_exclusive() {
        let task = Task::default();
        let mut candidate = solid_candidate("INTERN");
        candidate.utilization = Some(1.0);
        let (passed, _) = partition(&[candidate.clone()], &task);
        assert_eq!(passed, vec![0]);

        candidate.utilization = Some(1.05);
        let (passed, excluded) = partition(&[candidate], &task);
        assert!(passed.is_empty());
        assert_eq!(excluded.len(), 1);
    }
}
