use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::warn;

use super::status::{TrainingPhase, TrainingRun};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("training ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("training ledger entry could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only ledger of finished runs, optionally mirrored to a JSON-lines
/// file so it survives restarts.
#[derive(Debug, Default)]
pub struct TrainingHistory {
    runs: RwLock<Vec<TrainingRun>>,
    path: Option<PathBuf>,
}

impl TrainingHistory {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or start) a ledger at `path`. Unreadable lines are skipped with a
    /// warning rather than losing the rest of the history.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let runs = match fs::read_to_string(&path) {
            Ok(text) => parse_ledger(&path, &text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(HistoryError::Io { path, source }),
        };
        Ok(Self {
            runs: RwLock::new(runs),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, run: TrainingRun) -> Result<(), HistoryError> {
        let mut runs = self.runs.write();
        if let Some(path) = &self.path {
            let line = serde_json::to_string(&run)?;
            let io_err = |source: std::io::Error| HistoryError::Io {
                path: path.clone(),
                source,
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(path).map_err(io_err)?;
            writeln!(file, "{line}").map_err(io_err)?;
        }
        runs.push(run);
        Ok(())
    }

    pub fn runs(&self) -> Vec<TrainingRun> {
        self.runs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    pub fn find(&self, training_id: &str) -> Option<TrainingRun> {
        self.runs
            .read()
            .iter()
            .rev()
            .find(|run| run.training_id == training_id)
            .cloned()
    }

    pub fn last(&self) -> Option<TrainingRun> {
        self.runs.read().last().cloned()
    }

    pub fn last_deployed(&self) -> Option<TrainingRun> {
        self.runs
            .read()
            .iter()
            .rev()
            .find(|run| run.status == TrainingPhase::Deployed)
            .cloned()
    }

    /// Start time of the most recent run that trained a model, deployed or
    /// not. Failed and skipped runs do not reset the schedule.
    pub fn last_training_at(&self) -> Option<DateTime<Utc>> {
        self.runs
            .read()
            .iter()
            .rev()
            .filter(|run| run.skipped.is_none())
            .find(|run| matches!(run.status, TrainingPhase::Deployed | TrainingPhase::Rejected))
            .map(|run| run.started_at)
    }
}

fn parse_ledger(path: &Path, text: &str) -> Vec<TrainingRun> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str(line) {
            Ok(run) => Some(run),
            Err(err) => {
                warn!(path = %path.display(), line = idx + 1, error = %err, "skipping unreadable ledger entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retraining::status::SkipReason;
    use crate::retraining::trigger::TriggerReason;

    fn finished(id: &str, status: TrainingPhase) -> TrainingRun {
        let mut run = TrainingRun::started(id);
        run.trigger = Some(TriggerReason::Forced);
        run.finish(status, status.as_str());
        run
    }

    #[test]
    fn ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history").join("runs.jsonl");

        let history = TrainingHistory::open(&path).unwrap();
        assert!(history.is_empty());
        history.append(finished("a", TrainingPhase::Deployed)).unwrap();
        history.append(finished("b", TrainingPhase::Failed)).unwrap();

        // A torn write at the end should not hide the earlier runs.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"training_id\":").unwrap();

        let reopened = TrainingHistory::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.find("b").unwrap().status, TrainingPhase::Failed);
        assert_eq!(reopened.last_deployed().unwrap().training_id, "a");
    }

    #[test]
    fn failed_runs_do_not_count_as_training() {
        let history = TrainingHistory::in_memory();
        history.append(finished("a", TrainingPhase::Failed)).unwrap();
        assert!(history.last_training_at().is_none());

        history.append(finished("b", TrainingPhase::Rejected)).unwrap();
        let trained_at = history.last_training_at();
        assert!(trained_at.is_some());
        assert!(history.last_deployed().is_none());

        let mut skipped = TrainingRun::started("c");
        skipped.skip(SkipReason::NotDue);
        history.append(skipped).unwrap();
        assert_eq!(history.last_training_at(), trained_at);
    }
}
