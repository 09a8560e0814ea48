use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Canonical comparison key for a skill label: NFKC folded (full-width input
/// becomes ASCII), lowercased, trimmed, inner whitespace collapsed to one space.
pub fn normalize_skill(skill: &str) -> String {
    let folded: String = skill.nfkc().collect::<String>().to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_skill_set(skills: &[String]) -> HashSet<String> {
    skills
        .iter()
        .map(|s| normalize_skill(s))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalized skills with duplicates removed, first occurrence order kept.
pub fn normalize_skills_vec(skills: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    skills
        .iter()
        .map(|s| normalize_skill(s))
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Jaccard overlap of two normalized skill sets; 0.0 when both are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_width_and_whitespace() {
        assert_eq!(normalize_skill("  Machine   Learning "), "machine learning");
        assert_eq!(normalize_skill("ＡＷＳ"), "aws");
        assert_eq!(normalize_skill("Node.js"), "node.js");
        assert_eq!(normalize_skill("React\u{3000}Native"), "react native");
    }

    #[test]
    fn vec_dedupes_and_keeps_first_order() {
        let skills = vec![
            "Python".to_string(),
            "SQL".to_string(),
            " python ".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_skills_vec(&skills), vec!["python", "sql"]);
        assert_eq!(normalize_skill_set(&skills).len(), 2);
    }

    #[test]
    fn jaccard_handles_empty_sets() {
        let empty = HashSet::new();
        assert_eq!(jaccard(&empty, &empty), 0.0);

        let a: HashSet<String> = ["python", "sql"].iter().map(|s| s.to_string()).collect();
        let b: HashSet<String> = ["python", "docker"].iter().map(|s| s.to_string()).collect();
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
    }
}
