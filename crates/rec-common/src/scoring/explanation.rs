/// Contributors below this share of the breakdown are not mentioned.
const MENTION_THRESHOLD: f64 = 0.15;
const MAX_DRIVERS: usize = 3;

const ACRONYMS: &[(&str, &str)] = &[("Ml", "ML"), ("Ai", "AI"), ("Api", "API"), ("Sql", "SQL"), ("Aws", "AWS"), ("Tfidf", "TF-IDF")];

/// `skill_match_ratio` -> `Skill Match Ratio`, with common acronyms upper-cased.
pub fn format_feature_name(feature: &str) -> String {
    feature
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            let word: String = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            };
            ACRONYMS
                .iter()
                .find(|(from, _)| *from == word)
                .map_or(word.clone(), |(_, to)| to.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Inputs for one explanation line.
#[derive(Debug, Clone, Copy)]
pub struct ExplanationInput<'a> {
    pub confidence: f64,
    pub importance: &'a [(String, f64)],
    pub skill_match: f64,
    pub performance: f64,
    pub utilization: f64,
}

/// "Good match - driven by Skill Match Ratio - good skill fit - high availability".
pub fn explain(input: &ExplanationInput<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(
        match input.confidence {
            c if c > 0.8 => "Excellent match",
            c if c > 0.6 => "Good match",
            c if c > 0.4 => "Moderate match",
            _ => "Limited match",
        }
        .to_string(),
    );

    let mut ranked: Vec<&(String, f64)> = input.importance.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let drivers: Vec<String> = ranked
        .into_iter()
        .take(MAX_DRIVERS)
        .filter(|(_, share)| *share > MENTION_THRESHOLD)
        .map(|(name, _)| format_feature_name(name))
        .collect();
    if !drivers.is_empty() {
        parts.push(format!("driven by {}", drivers.join(", ")));
    }

    if input.skill_match > 0.8 {
        parts.push("strong skill alignment".into());
    } else if input.skill_match > 0.5 {
        parts.push("good skill fit".into());
    } else if input.skill_match < 0.3 {
        parts.push("limited skill match".into());
    }

    if input.performance > 0.85 {
        parts.push("excellent performance history".into());
    } else if input.performance < 0.40 {
        parts.push("performance concerns".into());
    }

    if input.utilization < 0.50 {
        parts.push("high availability".into());
    } else if input.utilization > 0.90 {
        parts.push("limited availability".into());
    }

    parts.join(" - ")
}
