use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{Candidate, Task};

/// Status value that marks a finished assignment.
pub const COMPLETED_STATUS: &str = "COMPLETED";

/// One historical (candidate, task) pairing as delivered by the data collector.
///
/// Only the two ids are required; every other column may be absent from a
/// given export and derivation branches on presence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: String,
    pub task_id: String,

    // candidate
    #[serde(default)]
    pub user_skills: Vec<String>,
    #[serde(default)]
    pub seniority_level: Option<String>,
    #[serde(default)]
    pub years_experience: Option<f64>,
    #[serde(default)]
    pub utilization: Option<f64>,
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(default)]
    pub department_name: Option<String>,
    #[serde(default)]
    pub historical_performance: Option<f64>,
    #[serde(default)]
    pub success_rate: Option<f64>,

    // task
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,

    // outcome
    #[serde(default)]
    pub task_status: Option<String>,
    #[serde(default)]
    pub actual_hours: Option<f64>,
    #[serde(default)]
    pub performance_score: Option<f64>,
    #[serde(default)]
    pub skill_match_score: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl InteractionRecord {
    /// Prediction-time record: candidate and task attributes, no outcome.
    pub fn for_prediction(candidate: &Candidate, task: &Task) -> Self {
        Self {
            user_id: candidate.id.clone(),
            task_id: task.id.clone().unwrap_or_default(),
            user_skills: candidate.skills.clone(),
            seniority_level: candidate.seniority_level.clone(),
            years_experience: candidate.years_experience,
            utilization: candidate.utilization,
            capacity: candidate.capacity,
            department_name: candidate.department_name.clone(),
            historical_performance: candidate.performance_score,
            success_rate: candidate.success_rate,
            task_title: task.title.clone(),
            priority: task.priority.clone(),
            difficulty: task.difficulty.clone(),
            required_skills: task.required_skills.clone(),
            estimated_hours: task.estimated_hours,
            created_at: task.assigned_at,
            ..Self::default()
        }
    }

    pub fn is_completed(&self) -> bool {
        self.task_status
            .as_deref()
            .map(|s| normalize_label(s) == COMPLETED_STATUS)
            .unwrap_or(false)
    }
}

/// Categorical label key: trimmed, uppercased, spaces and hyphens as `_`.
pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

fn parse_with_synonyms<T: FromStr>(raw: &str, synonyms: &[(&str, &str)]) -> Option<T> {
    let key = normalize_label(raw);
    key.parse().ok().or_else(|| {
        synonyms
            .iter()
            .find(|(alias, _)| *alias == key)
            .and_then(|(_, canonical)| canonical.parse().ok())
    })
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, AsRefStr, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const SYNONYMS: &'static [(&'static str, &'static str)] = &[
        ("CRITICAL", "URGENT"),
        ("BLOCKER", "URGENT"),
        ("MAJOR", "HIGH"),
        ("NORMAL", "MEDIUM"),
        ("MINOR", "LOW"),
    ];

    pub fn from_label(raw: &str) -> Option<Self> {
        parse_with_synonyms(raw, Self::SYNONYMS)
    }

    pub fn weight(self) -> f64 {
        match self {
            Priority::Low => 1.0,
            Priority::Medium => 2.0,
            Priority::High => 3.0,
            Priority::Urgent => 4.0,
        }
    }

    /// HIGH or URGENT.
    pub fn is_pressing(self) -> bool {
        matches!(self, Priority::High | Priority::Urgent)
    }

    pub fn labels() -> Vec<&'static str> {
        Self::iter().map(Into::into).collect()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, AsRefStr, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const SYNONYMS: &'static [(&'static str, &'static str)] = &[
        ("SIMPLE", "EASY"),
        ("TRIVIAL", "EASY"),
        ("MODERATE", "MEDIUM"),
        ("NORMAL", "MEDIUM"),
        ("COMPLEX", "HARD"),
        ("DIFFICULT", "HARD"),
    ];

    pub fn from_label(raw: &str) -> Option<Self> {
        parse_with_synonyms(raw, Self::SYNONYMS)
    }

    pub fn weight(self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 2.0,
            Difficulty::Hard => 3.0,
        }
    }

    /// Lowest seniority rank expected to handle this difficulty.
    pub fn minimum_seniority(self) -> u8 {
        match self {
            Difficulty::Easy => Seniority::Intern.level(),
            Difficulty::Medium => Seniority::Junior.level(),
            Difficulty::Hard => Seniority::MidLevel.level(),
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::iter().map(Into::into).collect()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, AsRefStr, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Seniority {
    Intern,
    Junior,
    MidLevel,
    Senior,
    Lead,
    Principal,
    Director,
}

impl Seniority {
    pub const SYNONYMS: &'static [(&'static str, &'static str)] = &[
        ("TRAINEE", "INTERN"),
        ("ENTRY_LEVEL", "JUNIOR"),
        ("ENTRY", "JUNIOR"),
        ("JR", "JUNIOR"),
        ("MID", "MID_LEVEL"),
        ("MIDDLE", "MID_LEVEL"),
        ("INTERMEDIATE", "MID_LEVEL"),
        ("SR", "SENIOR"),
        ("TEAM_LEAD", "LEAD"),
        ("TECH_LEAD", "LEAD"),
        ("STAFF", "PRINCIPAL"),
        ("HEAD", "DIRECTOR"),
    ];

    pub fn from_label(raw: &str) -> Option<Self> {
        parse_with_synonyms(raw, Self::SYNONYMS)
    }

    /// Rank on the INTERN=1 .. DIRECTOR=7 ladder.
    pub fn level(self) -> u8 {
        match self {
            Seniority::Intern => 1,
            Seniority::Junior => 2,
            Seniority::MidLevel => 3,
            Seniority::Senior => 4,
            Seniority::Lead => 5,
            Seniority::Principal => 6,
            Seniority::Director => 7,
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::iter().map(Into::into).collect()
    }
}
