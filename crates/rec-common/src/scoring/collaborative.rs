use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::collaborative::canonical_seniority;
use crate::models::UserProfile;
use crate::schema::normalize_label;
use crate::skill_normalizer::{jaccard, normalize_skill_set};
use crate::Candidate;

pub const MAX_NEIGHBOURS: usize = 10;
/// Score for a candidate with no similar historical users.
pub const NEUTRAL_SCORE: f64 = 0.5;

const SKILL_WEIGHT: f64 = 0.6;
const DEPARTMENT_WEIGHT: f64 = 0.2;
const SENIORITY_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct CollaborativeLookup {
    pub score: f64,
    pub neighbours: usize,
}

/// Serving-time collaborative score: the similarity-weighted mean
/// performance of up to ten other historical users who resemble the
/// candidate.
pub fn collaborative_score(candidate: &Candidate, profiles: &[UserProfile]) -> CollaborativeLookup {
    let skills = normalize_skill_set(&candidate.skills);
    let department = candidate.department_name.as_deref().map(normalize_label);
    let seniority = candidate.seniority_level.as_deref().map(canonical_seniority);

    let mut neighbours: Vec<(f64, &UserProfile)> = profiles
        .iter()
        .filter(|profile| profile.user_id != candidate.id)
        .map(|profile| {
            let profile_skills: HashSet<String> = profile.skills.iter().cloned().collect();
            let same_department = department.is_some() && department == profile.department;
            let same_seniority = seniority.is_some() && seniority == profile.seniority;
            let similarity = SKILL_WEIGHT * jaccard(&skills, &profile_skills)
                + DEPARTMENT_WEIGHT * f64::from(u8::from(same_department))
                + SENIORITY_WEIGHT * f64::from(u8::from(same_seniority));
            (similarity, profile)
        })
        .filter(|(similarity, _)| *similarity > 0.0)
        .collect();

    neighbours.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.user_id.cmp(&b.1.user_id))
    });
    neighbours.truncate(MAX_NEIGHBOURS);

    let weight: f64 = neighbours.iter().map(|(s, _)| s).sum();
    if neighbours.is_empty() || weight <= 0.0 {
        return CollaborativeLookup {
            score: NEUTRAL_SCORE,
            neighbours: 0,
        };
    }
    let score = neighbours.iter().map(|(s, p)| s * p.mean_performance).sum::<f64>() / weight;
    CollaborativeLookup {
        score,
        neighbours: neighbours.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, skills: &[&str], department: &str, performance: f64) -> UserProfile {
        UserProfile {
            user_id: id.into(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            department: Some(department.into()),
            seniority: Some("SENIOR".into()),
            mean_performance: performance,
            interactions: 3,
        }
    }

    fn candidate() -> Candidate {
        Candidate {
            id: "me".into(),
            skills: vec!["Python".into(), "SQL".into()],
            department_name: Some("engineering".into()),
            seniority_level: Some("jr".into()),
            ..Candidate::default()
        }
    }

    #[test]
    fn no_history_is_neutral() {
        let lookup = collaborative_score(&candidate(), &[]);
        assert_eq!(lookup.score, NEUTRAL_SCORE);
        assert_eq!(lookup.neighbours, 0);
    }

    #[test]
    fn self_and_unrelated_users_are_ignored() {
        let profiles = vec![
            profile("me", &["python", "sql"], "ENGINEERING", 0.1),
            profile("other", &["cobol"], "FINANCE", 0.9),
        ];
        let lookup = collaborative_score(&candidate(), &profiles);
        assert_eq!(lookup.score, NEUTRAL_SCORE);
    }

    #[test]
    fn similarity_weighted_mean() {
        let profiles = vec![
            // skills 1.0 * 0.6 + department 0.2 = 0.8
            profile("a", &["python", "sql"], "ENGINEERING", 0.9),
            // skills 0.5 * 0.6 = 0.3
            profile("b", &["python"], "FINANCE", 0.3),
        ];
        let lookup = collaborative_score(&candidate(), &profiles);
        let expected = (0.8 * 0.9 + 0.3 * 0.3) / 1.1;
        assert_eq!(lookup.neighbours, 2);
        assert!((lookup.score - expected).abs() < 1e-9);
    }

    #[test]
    fn caps_at_ten_neighbours() {
        let profiles: Vec<_> = (0..15)
            .map(|i| profile(&format!("u{i:02}"), &["python"], "ENGINEERING", 0.5))
            .collect();
        assert_eq!(collaborative_score(&candidate(), &profiles).neighbours, MAX_NEIGHBOURS);
    }
}
