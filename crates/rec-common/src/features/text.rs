//! TF-IDF columns over the task text (title plus required skills).
//!
//! The vocabulary keeps the `MAX_VOCABULARY` most frequent terms with a
//! smoothed idf, `ln((1 + n) / (1 + df)) + 1`. Document vectors are
//! l2-normalized over that whole vocabulary; only the `MAX_TEXT_COLUMNS`
//! terms with the largest summed weight across the training corpus become
//! feature columns.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

pub const TFIDF_PREFIX: &str = "tfidf_";
pub const MAX_VOCABULARY: usize = 1000;
pub const MAX_TEXT_COLUMNS: usize = 50;

pub fn task_text(title: Option<&str>, required_skills: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(required_skills.len() + 1);
    if let Some(title) = title {
        parts.push(title);
    }
    parts.extend(required_skills.iter().map(String::as_str));
    parts.join(" ")
}

/// Lower-cased alphanumeric runs of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

fn l2_normalize(weights: &mut BTreeMap<&str, f64>) {
    let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 1e-12 {
        weights.values_mut().for_each(|w| *w /= norm);
    }
}

/// Fitted text vocabulary, persisted with the feature schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextVocabulary {
    pub idf: BTreeMap<String, f64>,
    /// Terms emitted as columns, in column order.
    pub selected: Vec<String>,
}

impl TextVocabulary {
    pub fn fit(documents: &[String]) -> Self {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();

        let mut frequency: HashMap<&str, usize> = HashMap::new();
        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen: HashSet<&str> = HashSet::new();
            for token in tokens {
                *frequency.entry(token.as_str()).or_default() += 1;
                if seen.insert(token.as_str()) {
                    *document_frequency.entry(token.as_str()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = frequency.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(MAX_VOCABULARY);

        let n = documents.len() as f64;
        let idf = ranked
            .iter()
            .map(|(term, _)| {
                let df = document_frequency.get(term).copied().unwrap_or(0) as f64;
                ((*term).to_string(), ((1.0 + n) / (1.0 + df)).ln() + 1.0)
            })
            .collect();
        let mut vocabulary = Self {
            idf,
            selected: Vec::new(),
        };

        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for tokens in &tokenized {
            for (term, weight) in vocabulary.weights(tokens) {
                *totals.entry(term).or_default() += weight;
            }
        }
        let mut by_weight: Vec<(&str, f64)> = totals.into_iter().filter(|(_, w)| *w > 0.0).collect();
        by_weight.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let selected: Vec<String> = by_weight
            .into_iter()
            .take(MAX_TEXT_COLUMNS)
            .map(|(term, _)| term.to_string())
            .collect();
        vocabulary.selected = selected;
        vocabulary
    }

    fn weights<'a>(&'a self, tokens: &[String]) -> BTreeMap<&'a str, f64> {
        let mut weights: BTreeMap<&'a str, f64> = BTreeMap::new();
        for token in tokens {
            if let Some((term, idf)) = self.idf.get_key_value(token.as_str()) {
                *weights.entry(term.as_str()).or_default() += idf;
            }
        }
        l2_normalize(&mut weights);
        weights
    }

    pub fn columns(&self) -> Vec<String> {
        self.selected
            .iter()
            .map(|term| format!("{TFIDF_PREFIX}{term}"))
            .collect()
    }

    /// Values for `columns()`, same order. Unknown terms contribute nothing.
    pub fn transform(&self, text: &str) -> Vec<f64> {
        let weights = self.weights(&tokenize(text));
        self.selected
            .iter()
            .map(|term| weights.get(term.as_str()).copied().unwrap_or(0.0))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tokenizer_drops_single_characters() {
        assert_eq!(tokenize("Bug Fix - Task 12, C"), vec!["bug", "fix", "task", "12"]);
        assert!(tokenize(" - ").is_empty());
    }

    #[test]
    fn task_text_joins_title_and_skills() {
        let skills = vec!["Rust".to_string(), "SQL".to_string()];
        assert_eq!(task_text(Some("Bug Fix"), &skills), "Bug Fix Rust SQL");
        assert_eq!(task_text(None, &skills), "Rust SQL");
    }

    #[test]
    fn rarer_terms_get_higher_idf() {
        let vocabulary = TextVocabulary::fit(&docs(&["rust api", "rust db", "python api"]));
        let rust = vocabulary.idf["rust"];
        let python = vocabulary.idf["python"];
        assert!((rust - ((4.0_f64 / 3.0).ln() + 1.0)).abs() < 1e-12);
        assert!(python > rust);
        assert_eq!(vocabulary.selected.len(), 4);
    }

    #[test]
    fn transform_is_unit_length_and_ignores_unknown_terms() {
        let vocabulary = TextVocabulary::fit(&docs(&["rust api", "rust db", "python api"]));
        let values = vocabulary.transform("Rust API");
        let norm: f64 = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);

        assert!(vocabulary.transform("cobol mainframe").iter().all(|v| *v == 0.0));
        assert_eq!(vocabulary.transform("").len(), vocabulary.columns().len());
    }

    #[test]
    fn columns_are_capped_and_prefixed() {
        let corpus: Vec<String> = (0..80).map(|i| format!("term{i} shared")).collect();
        let vocabulary = TextVocabulary::fit(&corpus);
        let columns = vocabulary.columns();
        assert_eq!(columns.len(), MAX_TEXT_COLUMNS);
        assert!(columns.iter().all(|c| c.starts_with(TFIDF_PREFIX)));
        assert_eq!(vocabulary.idf.len(), 81);
    }

    #[test]
    fn empty_corpus_yields_no_columns() {
        let vocabulary = TextVocabulary::fit(&[]);
        assert!(vocabulary.is_empty());
        assert!(vocabulary.transform("rust").is_empty());
    }
}
