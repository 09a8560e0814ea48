//! Synthetic interaction history for bootstrapping a first model.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::data_source::{DataSourceError, TrainingDataSource};
use crate::schema::InteractionRecord;

pub const SKILL_CATALOGUE: &[&str] = &[
    "Python",
    "Java",
    "JavaScript",
    "React",
    "Node.js",
    "SQL",
    "Docker",
    "AWS",
    "MongoDB",
    "PostgreSQL",
    "Machine Learning",
    "UI/UX",
    "Testing",
];

const DEPARTMENTS: &[&str] = &["Engineering", "Product", "Design", "QA", "DevOps", "Data Science"];
const SENIORITY: &[(&str, f64)] = &[
    ("INTERN", 0.0),
    ("JUNIOR", 0.1),
    ("MID_LEVEL", 0.2),
    ("SENIOR", 0.3),
    ("LEAD", 0.4),
    ("PRINCIPAL", 0.5),
];
const PRIORITIES: &[&str] = &["LOW", "MEDIUM", "HIGH", "CRITICAL"];
const DIFFICULTIES: &[(&str, f64)] = &[("EASY", 0.1), ("MEDIUM", 0.0), ("HARD", -0.1)];
const TASK_TYPES: &[&str] = &[
    "Feature Development",
    "Bug Fix",
    "Testing",
    "Documentation",
    "Code Review",
    "Research",
    "Deployment",
    "Optimization",
];

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub users: usize,
    pub tasks: usize,
    pub interactions: usize,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            users: 100,
            tasks: 200,
            interactions: 1000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct SyntheticUser {
    id: String,
    department: &'static str,
    seniority: &'static str,
    seniority_bonus: f64,
    skills: Vec<String>,
    years_experience: f64,
    utilization: f64,
    capacity: f64,
}

#[derive(Debug, Clone)]
struct SyntheticTask {
    id: String,
    title: String,
    priority: &'static str,
    difficulty: &'static str,
    difficulty_adjustment: f64,
    required_skills: Vec<String>,
    estimated_hours: f64,
    actual_hours: Option<f64>,
    status: &'static str,
    created: DateTime<Utc>,
}

fn pick<'a, T, R: Rng + ?Sized>(items: &'a [T], rng: &mut R) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

fn sample_skills<R: Rng + ?Sized>(rng: &mut R, min: usize, max: usize) -> Vec<String> {
    let amount = rng.random_range(min..=max).min(SKILL_CATALOGUE.len());
    rand::seq::index::sample(rng, SKILL_CATALOGUE.len(), amount)
        .into_iter()
        .map(|i| SKILL_CATALOGUE[i].to_string())
        .collect()
}

/// Standard normal draw (Box-Muller).
fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Seeded generator: the same config always yields the same records, apart
/// from timestamps which are relative to the time of generation.
#[derive(Debug, Clone, Default)]
pub struct SyntheticDataGenerator {
    config: SyntheticConfig,
}

impl SyntheticDataGenerator {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    pub fn generate(&self) -> Vec<InteractionRecord> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let now = Utc::now();
        let users: Vec<_> = (0..self.config.users.max(1)).map(|i| generate_user(&mut rng, i)).collect();
        let tasks: Vec<_> = (0..self.config.tasks.max(1))
            .map(|i| generate_task(&mut rng, i, now))
            .collect();

        let records: Vec<_> = (0..self.config.interactions)
            .map(|_| {
                let user = pick(&users, &mut rng);
                let task = pick(&tasks, &mut rng);
                interaction(&mut rng, user, task)
            })
            .collect();
        info!(
            users = users.len(),
            tasks = tasks.len(),
            records = records.len(),
            "synthetic dataset generated"
        );
        records
    }
}

fn generate_user<R: Rng + ?Sized>(rng: &mut R, index: usize) -> SyntheticUser {
    let (seniority, seniority_bonus) = *pick(SENIORITY, rng);
    SyntheticUser {
        id: format!("user_{}", index + 1),
        department: *pick(DEPARTMENTS, rng),
        seniority,
        seniority_bonus,
        skills: sample_skills(rng, 3, 8),
        years_experience: f64::from(rng.random_range(0u32..15)),
        utilization: rng.random_range(0.5..1.0),
        capacity: f64::from(rng.random_range(20u32..50)),
    }
}

fn generate_task<R: Rng + ?Sized>(rng: &mut R, index: usize, now: DateTime<Utc>) -> SyntheticTask {
    let estimated_hours = f64::from(rng.random_range(2u32..40));
    // Most tasks land close to the estimate, the rest overrun substantially.
    let overrun = if rng.random::<f64>() < 0.7 {
        rng.random_range(0.8..1.3)
    } else {
        rng.random_range(1.4..2.5)
    };
    let actual_hours = (rng.random::<f64>() < 0.8).then_some(estimated_hours * overrun);
    let status = match rng.random::<f64>() {
        p if p < 0.7 => "COMPLETED",
        p if p < 0.9 => "IN_PROGRESS",
        _ => "CANCELLED",
    };
    let (difficulty, difficulty_adjustment) = *pick(DIFFICULTIES, rng);

    SyntheticTask {
        id: format!("task_{}", index + 1),
        title: format!("{} - Task {}", pick(TASK_TYPES, rng), index + 1),
        priority: *pick(PRIORITIES, rng),
        difficulty,
        difficulty_adjustment,
        required_skills: sample_skills(rng, 1, 5),
        estimated_hours,
        actual_hours,
        status,
        created: now - Duration::days(rng.random_range(1..180)),
    }
}

fn interaction<R: Rng + ?Sized>(rng: &mut R, user: &SyntheticUser, task: &SyntheticTask) -> InteractionRecord {
    let overlap = task
        .required_skills
        .iter()
        .filter(|skill| user.skills.contains(skill))
        .count();
    let skill_match = if task.required_skills.is_empty() {
        0.0
    } else {
        overlap as f64 / task.required_skills.len() as f64
    };
    let performance = (skill_match * 0.5 + user.seniority_bonus + task.difficulty_adjustment + 0.1 * gaussian(rng))
        .clamp(0.0, 1.0);

    InteractionRecord {
        user_id: user.id.clone(),
        task_id: task.id.clone(),
        user_skills: user.skills.clone(),
        seniority_level: Some(user.seniority.to_string()),
        years_experience: Some(user.years_experience),
        utilization: Some(user.utilization),
        capacity: Some(user.capacity),
        department_name: Some(user.department.to_string()),
        task_title: Some(task.title.clone()),
        priority: Some(task.priority.to_string()),
        difficulty: Some(task.difficulty.to_string()),
        required_skills: task.required_skills.clone(),
        estimated_hours: Some(task.estimated_hours),
        task_status: Some(task.status.to_string()),
        actual_hours: task.actual_hours,
        performance_score: Some(performance),
        skill_match_score: Some(skill_match),
        created_at: Some(task.created + Duration::hours(rng.random_range(1..48))),
        ..InteractionRecord::default()
    }
}

impl TrainingDataSource for SyntheticDataGenerator {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn collect(&self, _months_back: u32) -> Result<Vec<InteractionRecord>, DataSourceError> {
        Ok(self.generate())
    }

    fn count_records_since(&self, _since: DateTime<Utc>) -> Result<usize, DataSourceError> {
        Ok(self.config.interactions)
    }
}
