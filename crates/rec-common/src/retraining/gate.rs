use serde::{Deserialize, Serialize};

use super::config::RetrainingConfig;
use crate::models::ClassificationMetrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentDecision {
    pub deploy: bool,
    pub first_training: bool,
    pub accuracy_improvement: f64,
    pub f1_improvement: f64,
    pub reason: String,
}

/// Deployment gate. A candidate replaces the deployed model when it improves
/// accuracy or F1 by at least `min_accuracy_improvement` (or nothing is
/// deployed yet), and neither metric drops by more than `max_regression`.
pub fn decide(
    current: Option<&ClassificationMetrics>,
    candidate: &ClassificationMetrics,
    config: &RetrainingConfig,
) -> DeploymentDecision {
    let Some(current) = current else {
        return DeploymentDecision {
            deploy: true,
            first_training: true,
            accuracy_improvement: candidate.accuracy,
            f1_improvement: candidate.f1,
            reason: "no deployed model".into(),
        };
    };

    let accuracy_improvement = candidate.accuracy - current.accuracy;
    let f1_improvement = candidate.f1 - current.f1;
    let improved = accuracy_improvement >= config.min_accuracy_improvement
        || f1_improvement >= config.min_accuracy_improvement;
    let regressed = accuracy_improvement < -config.max_regression || f1_improvement < -config.max_regression;

    let reason = if regressed {
        format!("regression: accuracy {accuracy_improvement:+.4}, f1 {f1_improvement:+.4}")
    } else if improved {
        format!("improved: accuracy {accuracy_improvement:+.4}, f1 {f1_improvement:+.4}")
    } else {
        format!(
            "insufficient improvement: accuracy {accuracy_improvement:+.4}, f1 {f1_improvement:+.4} (min {:.4})",
            config.min_accuracy_improvement
        )
    };

    DeploymentDecision {
        deploy: improved && !regressed,
        first_training: false,
        accuracy_improvement,
        f1_improvement,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(accuracy: f64, f1: f64) -> ClassificationMetrics {
        ClassificationMetrics {
            accuracy,
            f1,
            ..ClassificationMetrics::default()
        }
    }

    #[test]
    fn small_f1_gain_deploys() {
        let config = RetrainingConfig::default();
        let decision = decide(Some(&metrics(0.70, 0.70)), &metrics(0.70, 0.715), &config);
        assert!(decision.deploy, "{}", decision.reason);
        assert!((decision.f1_improvement - 0.015).abs() < 1e-9);
    }

    #[test]
    fn first_training_deploys_unconditionally() {
        let decision = decide(None, &metrics(0.4, 0.3), &RetrainingConfig::default());
        assert!(decision.deploy);
        assert!(decision.first_training);
    }

    #[test]
    fn flat_or_regressing_candidates_are_rejected() {
        let config = RetrainingConfig::default();
        let flat = decide(Some(&metrics(0.80, 0.78)), &metrics(0.805, 0.782), &config);
        assert!(!flat.deploy);

        // F1 up, accuracy down past the tolerance.
        let mixed = decide(Some(&metrics(0.80, 0.70)), &metrics(0.77, 0.75), &config);
        assert!(!mixed.deploy);
        assert!(mixed.reason.starts_with("regression"));

        // Small accuracy dip within tolerance.
        let tolerated = decide(Some(&metrics(0.80, 0.70)), &metrics(0.79, 0.75), &config);
        assert!(tolerated.deploy);
    }
}
