pub mod artifact;
pub mod data_source;
pub mod embedding;
pub mod features;
pub mod logging;
pub mod matching;
pub mod models;
pub mod retraining;
pub mod run_id;
pub mod schema;
pub mod scoring;
pub mod service;
pub mod skill_normalizer;
pub mod synthetic;
pub mod trainer;

use chrono::{DateTime, Utc};
use schema::{Difficulty, Priority, Seniority};
use serde::{Deserialize, Serialize};

/// Default task size used when a task carries no estimate.
pub const DEFAULT_ESTIMATED_HOURS: f64 = 40.0;
/// Default weekly capacity used when a candidate carries neither capacity nor availability.
pub const DEFAULT_CAPACITY_HOURS: f64 = 40.0;

// Serving-time inputs: the task being assigned and the people who could take it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    /// When the assignment is made; feeds the day-of-week and hour features.
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn priority_level(&self) -> Priority {
        self.priority
            .as_deref()
            .and_then(Priority::from_label)
            .unwrap_or(Priority::Medium)
    }

    pub fn difficulty_level(&self) -> Difficulty {
        self.difficulty
            .as_deref()
            .and_then(Difficulty::from_label)
            .unwrap_or(Difficulty::Medium)
    }

    pub fn estimated_hours_or_default(&self) -> f64 {
        self.estimated_hours
            .filter(|hours| hours.is_finite() && *hours >= 0.0)
            .unwrap_or(DEFAULT_ESTIMATED_HOURS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub seniority_level: Option<String>,
    #[serde(default)]
    pub years_experience: Option<f64>,
    #[serde(default)]
    pub utilization: Option<f64>,
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(default)]
    pub available_capacity: Option<f64>,
    #[serde(default)]
    pub department_name: Option<String>,
    /// Historical performance on a 0.0〜1.0 scale (0〜100 is rescaled per batch).
    #[serde(default)]
    pub performance_score: Option<f64>,
    #[serde(default)]
    pub success_rate: Option<f64>,
}

impl Candidate {
    pub fn performance(&self) -> f64 {
        finite_or(self.performance_score, 0.5)
    }

    pub fn success(&self) -> f64 {
        finite_or(self.success_rate, 0.5)
    }

    pub fn current_utilization(&self) -> f64 {
        finite_or(self.utilization, 0.5)
    }

    pub fn experience_years(&self) -> f64 {
        finite_or(self.years_experience, 0.0).max(0.0)
    }

    /// Hours the candidate can still take on: explicit availability first,
    /// then capacity scaled by the free share of utilization.
    pub fn hours_available(&self) -> f64 {
        if let Some(available) = self.available_capacity.filter(|v| v.is_finite()) {
            return available;
        }
        match self.capacity.filter(|v| v.is_finite()) {
            Some(capacity) => capacity * (1.0 - self.current_utilization()),
            None => DEFAULT_CAPACITY_HOURS,
        }
    }

    /// Seniority on the 1..=7 ladder; unknown titles count as JUNIOR.
    pub fn seniority_rank(&self) -> u8 {
        self.seniority_level
            .as_deref()
            .and_then(Seniority::from_label)
            .map(Seniority::level)
            .unwrap_or(Seniority::Junior.level())
    }
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}
