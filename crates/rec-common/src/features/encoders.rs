use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::AsRefStr;
use tracing::warn;

use super::imputation::PreparedRecord;
use crate::schema::{normalize_label, Difficulty, Priority, Seniority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CategoricalColumn {
    Priority,
    Difficulty,
    Department,
    Seniority,
}

impl CategoricalColumn {
    pub const ALL: [CategoricalColumn; 4] = [
        CategoricalColumn::Priority,
        CategoricalColumn::Difficulty,
        CategoricalColumn::Department,
        CategoricalColumn::Seniority,
    ];

    pub fn feature_name(self) -> &'static str {
        match self {
            CategoricalColumn::Priority => "priority_encoded",
            CategoricalColumn::Difficulty => "difficulty_encoded",
            CategoricalColumn::Department => "department_encoded",
            CategoricalColumn::Seniority => "seniority_encoded",
        }
    }

    pub fn value(self, record: &PreparedRecord) -> &str {
        match self {
            CategoricalColumn::Priority => &record.priority,
            CategoricalColumn::Difficulty => &record.difficulty,
            CategoricalColumn::Department => &record.department,
            CategoricalColumn::Seniority => &record.seniority,
        }
    }

    fn synonyms(self) -> &'static [(&'static str, &'static str)] {
        match self {
            CategoricalColumn::Priority => Priority::SYNONYMS,
            CategoricalColumn::Difficulty => Difficulty::SYNONYMS,
            CategoricalColumn::Seniority => Seniority::SYNONYMS,
            CategoricalColumn::Department => &[],
        }
    }

    pub fn synonym(self, label: &str) -> Option<&'static str> {
        self.synonyms()
            .iter()
            .find(|(alias, _)| *alias == label)
            .map(|(_, canonical)| *canonical)
    }

    /// Closed set of labels the column may legitimately carry. Department is
    /// open-ended, so it has none and unseen departments are never appended.
    pub fn vocabulary(self) -> Vec<&'static str> {
        match self {
            CategoricalColumn::Priority => Priority::labels(),
            CategoricalColumn::Difficulty => Difficulty::labels(),
            CategoricalColumn::Seniority => Seniority::labels(),
            CategoricalColumn::Department => Vec::new(),
        }
    }
}

/// Label encoder: sorted unique classes, encoded by position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    classes: Vec<String>,
}

impl CategoricalEncoder {
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = labels.into_iter().map(|l| l.as_ref().to_string()).collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    /// Copy with `label` appended after the existing classes. Existing codes
    /// keep their positions.
    pub fn extended_with(&self, label: &str) -> Self {
        let mut classes = self.classes.clone();
        if !classes.iter().any(|c| c == label) {
            classes.push(label.to_string());
        }
        Self { classes }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelResolution {
    Synonym { canonical: String },
    Extended,
    FirstClass,
    /// The column had no trained encoder at all.
    MissingEncoder,
}

/// One schema-drift resolution made while encoding prediction rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderAuditEntry {
    pub column: CategoricalColumn,
    pub label: String,
    pub resolution: LabelResolution,
    pub encoded: usize,
}

/// Trained encoders, one per categorical column. Never mutated after fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncoderSet {
    encoders: BTreeMap<CategoricalColumn, CategoricalEncoder>,
}

impl EncoderSet {
    pub fn fit(records: &[PreparedRecord]) -> Self {
        let encoders = CategoricalColumn::ALL
            .iter()
            .map(|&column| {
                let encoder = CategoricalEncoder::fit(records.iter().map(|r| column.value(r)));
                (column, encoder)
            })
            .collect();
        Self { encoders }
    }

    pub fn get(&self, column: CategoricalColumn) -> Option<&CategoricalEncoder> {
        self.encoders.get(&column)
    }

    /// Training-time encoding: every label was seen during fit.
    pub fn encode_known(&self, column: CategoricalColumn, label: &str) -> f64 {
        self.get(column)
            .and_then(|e| e.index_of(label))
            .map(|i| i as f64)
            .unwrap_or(0.0)
    }
}

/// Prediction-time encoding over a shared `EncoderSet`.
///
/// Unseen labels go through synonym, append, first-class resolution. Appended
/// classes live in the session's private copies so the artifact stays
/// untouched; repeated unseen labels within one session reuse the same code.
pub struct EncoderSession<'a> {
    base: &'a EncoderSet,
    extended: BTreeMap<CategoricalColumn, CategoricalEncoder>,
    audit: Vec<EncoderAuditEntry>,
}

impl<'a> EncoderSession<'a> {
    pub fn new(base: &'a EncoderSet) -> Self {
        Self {
            base,
            extended: BTreeMap::new(),
            audit: Vec::new(),
        }
    }

    fn current(&self, column: CategoricalColumn) -> Option<&CategoricalEncoder> {
        self.extended.get(&column).or_else(|| self.base.get(column))
    }

    fn record(&mut self, column: CategoricalColumn, label: &str, resolution: LabelResolution, encoded: usize) -> f64 {
        warn!(
            column = column.as_ref(),
            label,
            resolution = ?resolution,
            encoded,
            "unseen categorical label at prediction time"
        );
        self.audit.push(EncoderAuditEntry {
            column,
            label: label.to_string(),
            resolution,
            encoded,
        });
        encoded as f64
    }

    pub fn encode(&mut self, column: CategoricalColumn, raw: &str) -> f64 {
        let label = normalize_label(raw);
        let Some(encoder) = self.current(column) else {
            return self.record(column, &label, LabelResolution::MissingEncoder, 0);
        };
        if let Some(idx) = encoder.index_of(&label) {
            return idx as f64;
        }

        let synonym = column.synonym(&label);
        if let Some(idx) = synonym.and_then(|canonical| encoder.index_of(canonical)) {
            let canonical = synonym.unwrap_or_default().to_string();
            return self.record(column, &label, LabelResolution::Synonym { canonical }, idx);
        }

        let candidate = synonym.unwrap_or(label.as_str());
        if column.vocabulary().iter().any(|known| *known == candidate) {
            let grown = encoder.extended_with(candidate);
            let idx = grown.classes().len() - 1;
            self.extended.insert(column, grown);
            return self.record(column, &label, LabelResolution::Extended, idx);
        }

        self.record(column, &label, LabelResolution::FirstClass, 0)
    }

    pub fn audit(&self) -> &[EncoderAuditEntry] {
        &self.audit
    }

    pub fn into_audit(self) -> Vec<EncoderAuditEntry> {
        self.audit
    }
}
