//! Where training records come from.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Months, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::InteractionRecord;

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: invalid record: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Historical interactions for the retraining controller.
pub trait TrainingDataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Records created within the last `months_back` months. Records without a
    /// timestamp are always included.
    fn collect(&self, months_back: u32) -> Result<Vec<InteractionRecord>, DataSourceError>;

    /// Records created strictly after `since`.
    fn count_records_since(&self, since: DateTime<Utc>) -> Result<usize, DataSourceError>;
}

fn window_start(months_back: u32) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_months(Months::new(months_back))
}

fn within_window(record: &InteractionRecord, start: Option<DateTime<Utc>>) -> bool {
    match (record.created_at, start) {
        (Some(created), Some(start)) => created >= start,
        _ => true,
    }
}

fn count_after(records: &[InteractionRecord], since: DateTime<Utc>) -> usize {
    records
        .iter()
        .filter(|r| r.created_at.is_some_and(|created| created > since))
        .count()
}

/// JSON export on disk: either one array of records or one record per line.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<InteractionRecord>, DataSourceError> {
        let text = fs::read_to_string(&self.path).map_err(|source| DataSourceError::Io {
            path: self.path.clone(),
            source,
        })?;

        if text.trim_start().starts_with('[') {
            return serde_json::from_str(&text).map_err(|source| DataSourceError::Parse {
                path: self.path.clone(),
                line: source.line(),
                source,
            });
        }

        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = serde_json::from_str(line).map_err(|source| DataSourceError::Parse {
                path: self.path.clone(),
                line: idx + 1,
                source,
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl TrainingDataSource for JsonFileSource {
    fn name(&self) -> &str {
        "json_file"
    }

    fn collect(&self, months_back: u32) -> Result<Vec<InteractionRecord>, DataSourceError> {
        let start = window_start(months_back);
        let all = self.read_all()?;
        let total = all.len();
        let records: Vec<_> = all.into_iter().filter(|r| within_window(r, start)).collect();
        debug!(path = %self.path.display(), total, kept = records.len(), months_back, "records collected");
        if records.is_empty() && total > 0 {
            warn!(path = %self.path.display(), months_back, "every record is outside the collection window");
        }
        Ok(records)
    }

    fn count_records_since(&self, since: DateTime<Utc>) -> Result<usize, DataSourceError> {
        Ok(count_after(&self.read_all()?, since))
    }
}

/// Records held in memory; callers push new interactions as they arrive.
#[derive(Debug, Default)]
pub struct InMemorySource {
    records: RwLock<Vec<InteractionRecord>>,
}

impl InMemorySource {
    pub fn new(records: Vec<InteractionRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn push(&self, record: InteractionRecord) {
        self.records.write().push(record);
    }

    pub fn extend(&self, records: impl IntoIterator<Item = InteractionRecord>) {
        self.records.write().extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl TrainingDataSource for InMemorySource {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn collect(&self, months_back: u32) -> Result<Vec<InteractionRecord>, DataSourceError> {
        let start = window_start(months_back);
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| within_window(r, start))
            .cloned()
            .collect())
    }

    fn count_records_since(&self, since: DateTime<Utc>) -> Result<usize, DataSourceError> {
        Ok(count_after(&self.records.read(), since))
    }
}
