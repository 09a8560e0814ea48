use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::text::task_text;
use crate::schema::{normalize_label, InteractionRecord};

pub const UNKNOWN_CATEGORY: &str = "UNKNOWN";

pub const ESTIMATED_HOURS: &str = "estimated_hours";
pub const ACTUAL_HOURS: &str = "actual_hours";
pub const YEARS_EXPERIENCE: &str = "years_experience";
pub const UTILIZATION: &str = "utilization";
pub const CAPACITY: &str = "capacity";
pub const HISTORICAL_PERFORMANCE: &str = "historical_performance";
pub const SUCCESS_RATE: &str = "success_rate";
pub const ASSIGNMENT_DAY_OF_WEEK: &str = "assignment_day_of_week";
pub const ASSIGNMENT_HOUR: &str = "assignment_hour";

pub const PRIORITY: &str = "priority";
pub const DIFFICULTY: &str = "difficulty";
pub const DEPARTMENT: &str = "department_name";
pub const SENIORITY: &str = "seniority_level";

/// A record with every gap filled: numeric columns concrete, categorical
/// labels normalized, skills as given (empty when absent).
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    pub user_skills: Vec<String>,
    pub required_skills: Vec<String>,
    pub priority: String,
    pub difficulty: String,
    pub department: String,
    pub seniority: String,
    pub estimated_hours: f64,
    pub years_experience: f64,
    pub utilization: f64,
    pub capacity: f64,
    pub historical_performance: f64,
    pub success_rate: f64,
    /// Monday = 0.
    pub assignment_day_of_week: f64,
    pub assignment_hour: f64,
    /// Task title followed by the required skills, space separated.
    pub text: String,
    /// Outcome column; only filled at training time.
    pub actual_hours: Option<f64>,
}

/// Train-time medians (numeric) and modes (categorical), persisted with the
/// artifact so prediction fills gaps the same way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImputationStats {
    pub medians: BTreeMap<String, f64>,
    pub modes: BTreeMap<String, String>,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn label(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(normalize_label)
        .filter(|l| !l.is_empty())
}

pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Most frequent label; ties go to the lexicographically smallest.
fn mode<I: IntoIterator<Item = String>>(labels: I) -> Option<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for l in labels {
        *counts.entry(l).or_default() += 1;
    }
    let best = counts.values().copied().max()?;
    counts.into_iter().find(|(_, c)| *c == best).map(|(l, _)| l)
}

fn day_of_week(record: &InteractionRecord) -> Option<f64> {
    record
        .created_at
        .map(|t| f64::from(t.weekday().num_days_from_monday()))
}

fn hour(record: &InteractionRecord) -> Option<f64> {
    record.created_at.map(|t| f64::from(t.hour()))
}

type NumericGetter = fn(&InteractionRecord) -> Option<f64>;
type LabelGetter = fn(&InteractionRecord) -> &Option<String>;

const NUMERIC: &[(&str, NumericGetter)] = &[
    (ESTIMATED_HOURS, |r| r.estimated_hours),
    (ACTUAL_HOURS, |r| r.actual_hours),
    (YEARS_EXPERIENCE, |r| r.years_experience),
    (UTILIZATION, |r| r.utilization),
    (CAPACITY, |r| r.capacity),
    (HISTORICAL_PERFORMANCE, |r| r.historical_performance),
    (SUCCESS_RATE, |r| r.success_rate),
    (ASSIGNMENT_DAY_OF_WEEK, day_of_week),
    (ASSIGNMENT_HOUR, hour),
];

const CATEGORICAL: &[(&str, LabelGetter)] = &[
    (PRIORITY, |r| &r.priority),
    (DIFFICULTY, |r| &r.difficulty),
    (DEPARTMENT, |r| &r.department_name),
    (SENIORITY, |r| &r.seniority_level),
];

impl ImputationStats {
    pub fn fit(records: &[InteractionRecord]) -> Self {
        let mut stats = Self::default();
        for (name, get) in NUMERIC {
            let mut values: Vec<f64> = records.iter().filter_map(|r| finite(get(r))).collect();
            if let Some(m) = median(&mut values) {
                stats.medians.insert((*name).to_string(), m);
            }
        }
        for (name, get) in CATEGORICAL {
            if let Some(m) = mode(records.iter().filter_map(|r| label(get(r)))) {
                stats.modes.insert((*name).to_string(), m);
            }
        }
        stats
    }

    fn numeric(&self, name: &str, value: Option<f64>) -> f64 {
        finite(value)
            .or_else(|| self.medians.get(name).copied())
            .unwrap_or(0.0)
    }

    fn categorical(&self, name: &str, value: &Option<String>) -> String {
        label(value)
            .or_else(|| self.modes.get(name).cloned())
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
    }

    fn prepare(&self, record: &InteractionRecord, fill_outcome: bool) -> PreparedRecord {
        let actual_hours = if fill_outcome {
            finite(record.actual_hours).or_else(|| self.medians.get(ACTUAL_HOURS).copied())
        } else {
            finite(record.actual_hours)
        };
        PreparedRecord {
            user_skills: record.user_skills.clone(),
            required_skills: record.required_skills.clone(),
            priority: self.categorical(PRIORITY, &record.priority),
            difficulty: self.categorical(DIFFICULTY, &record.difficulty),
            department: self.categorical(DEPARTMENT, &record.department_name),
            seniority: self.categorical(SENIORITY, &record.seniority_level),
            estimated_hours: self.numeric(ESTIMATED_HOURS, record.estimated_hours),
            years_experience: self.numeric(YEARS_EXPERIENCE, record.years_experience),
            utilization: self.numeric(UTILIZATION, record.utilization),
            capacity: self.numeric(CAPACITY, record.capacity),
            historical_performance: self.numeric(HISTORICAL_PERFORMANCE, record.historical_performance),
            success_rate: self.numeric(SUCCESS_RATE, record.success_rate),
            assignment_day_of_week: self.numeric(ASSIGNMENT_DAY_OF_WEEK, day_of_week(record)),
            assignment_hour: self.numeric(ASSIGNMENT_HOUR, hour(record)),
            text: task_text(record.task_title.as_deref(), &record.required_skills),
            actual_hours,
        }
    }

    /// Training rows: outcome gaps are filled too.
    pub fn apply(&self, record: &InteractionRecord) -> PreparedRecord {
        self.prepare(record, true)
    }

    /// Prediction rows carry no outcome; actual hours stay unknown.
    pub fn apply_for_prediction(&self, record: &InteractionRecord) -> PreparedRecord {
        self.prepare(record, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hours: Option<f64>, seniority: Option<&str>) -> InteractionRecord {
        InteractionRecord {
            user_id: "u".into(),
            task_id: "t".into(),
            estimated_hours: hours,
            seniority_level: seniority.map(str::to_string),
            ..InteractionRecord::default()
        }
    }

    #[test]
    fn median_handles_even_and_odd_lengths() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn fills_numeric_with_median_and_categorical_with_mode() {
        let records = vec![
            record(Some(10.0), Some("senior")),
            record(Some(30.0), Some("SENIOR")),
            record(None, Some("junior")),
            record(Some(f64::NAN), None),
        ];
        let stats = ImputationStats::fit(&records);
        assert_eq!(stats.medians.get(ESTIMATED_HOURS), Some(&20.0));
        assert_eq!(stats.modes.get(SENIORITY).map(String::as_str), Some("SENIOR"));

        let prepared = stats.apply(&records[3]);
        assert_eq!(prepared.estimated_hours, 20.0);
        assert_eq!(prepared.seniority, "SENIOR");
        assert_eq!(prepared.department, UNKNOWN_CATEGORY);
        assert_eq!(prepared.capacity, 0.0);
    }

    #[test]
    fn prediction_leaves_actual_hours_unknown() {
        let mut with_actual = record(Some(10.0), None);
        with_actual.actual_hours = Some(12.0);
        let stats = ImputationStats::fit(&[with_actual]);

        let fresh = record(Some(8.0), None);
        assert_eq!(stats.apply(&fresh).actual_hours, Some(12.0));
        assert_eq!(stats.apply_for_prediction(&fresh).actual_hours, None);
    }

    #[test]
    fn empty_stats_fall_back_to_zero_and_unknown() {
        let prepared = ImputationStats::default().apply(&record(None, None));
        assert_eq!(prepared.estimated_hours, 0.0);
        assert_eq!(prepared.priority, UNKNOWN_CATEGORY);
        assert!(prepared.user_skills.is_empty());
    }
}
