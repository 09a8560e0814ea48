use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use rec_common::data_source::{InMemorySource, JsonFileSource, TrainingDataSource};
use rec_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use rec_common::retraining::{RunOutcome, RunRequest, SkipReason, TrainingPhase};
use rec_common::service::{RecommendationService, ServiceError};
use rec_common::{run_id, Candidate, Task};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

const APP_NAME: &str = "rec-trainer";

#[derive(Debug, Parser)]
#[command(name = "rec-trainer", about = "Train, deploy and query task-assignment recommendation models")]
struct Cli {
    /// Interaction export (JSON array or JSON lines) used as training data
    #[arg(long, global = true, env = "REC_TRAINING_DATA")]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one retraining pass and wait for it to finish
    Train {
        /// Train on generated data instead of --data
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Skip the trigger check (the data guard and deployment gate still apply)
        #[arg(long, default_value_t = false)]
        force: bool,

        /// How many months of history to collect (default: REC_DATA_MONTHS_BACK)
        #[arg(long)]
        months_back: Option<u32>,

        /// Write the evaluation report (labels, predictions, importances) here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Check the retraining trigger periodically until interrupted
    Schedule {
        #[arg(long, env = "REC_SCHEDULE_INTERVAL_MINUTES", default_value_t = 60)]
        interval_minutes: u64,
    },
    /// Score candidates for a task against the active model
    Predict {
        /// JSON request file; reads stdin when omitted
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Print the active model's status
    Health,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to read {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("training run {training_id} failed: {message}")]
    RunFailed { training_id: String, message: String },
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    task: Task,
    candidates: Vec<Candidate>,
    #[serde(default)]
    max_recommendations: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SkippedRun<'a> {
    skipped: &'a SkipReason,
}

fn data_source(data: Option<PathBuf>) -> Arc<dyn TrainingDataSource> {
    match data {
        Some(path) => Arc::new(JsonFileSource::new(path)),
        None => Arc::new(InMemorySource::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn train(
    service: &RecommendationService,
    request: RunRequest,
    report: Option<PathBuf>,
) -> Result<(), CliError> {
    let job = service.start_training(request)?;
    info!(training_id = %job.training_id, "training started");

    match job.wait().await? {
        RunOutcome::Skipped(reason) => {
            warn!(%reason, "training pass skipped");
            print_json(&SkippedRun { skipped: &reason })
        }
        RunOutcome::Finished(run) => {
            print_json(&run)?;
            if let Some(reason) = &run.skipped {
                warn!(training_id = %run.training_id, %reason, "training pass stopped before training");
                return Ok(());
            }
            if let (Some(path), Some(evaluation)) = (report, service.last_evaluation()) {
                std::fs::write(&path, evaluation.to_json()?).map_err(|source| CliError::Io {
                    what: path.display().to_string(),
                    source,
                })?;
                info!(path = %path.display(), "evaluation report written");
            }
            if run.status == TrainingPhase::Failed {
                return Err(CliError::RunFailed {
                    training_id: run.training_id,
                    message: run.message.unwrap_or_default(),
                });
            }
            Ok(())
        }
    }
}

async fn schedule(service: RecommendationService, interval_minutes: u64) -> Result<(), CliError> {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_minutes.max(1) * 60));
    info!(interval_minutes, "retraining scheduler started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let controller = Arc::clone(service.controller());
                match tokio::task::spawn_blocking(move || controller.run_once(RunRequest::default())).await {
                    Ok(RunOutcome::Finished(run)) => info!(
                        training_id = %run.training_id,
                        status = run.outcome_label(),
                        model_version = ?run.model_version,
                        "scheduled retraining finished"
                    ),
                    Ok(RunOutcome::Skipped(reason)) => info!(%reason, "scheduled retraining skipped"),
                    Err(err) => error!(error = %err, "scheduled retraining task aborted"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested; scheduler stopping");
                return Ok(());
            }
        }
    }
}

fn predict(service: &RecommendationService, request: Option<PathBuf>) -> Result<(), CliError> {
    let body = match request {
        Some(path) => std::fs::read_to_string(&path).map_err(|source| CliError::Io {
            what: path.display().to_string(),
            source,
        })?,
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .map_err(|source| CliError::Io {
                    what: "stdin".into(),
                    source,
                })?;
            body
        }
    };
    let request: PredictRequest = serde_json::from_str(&body)?;
    let batch = service.predict(&request.task, &request.candidates, request.max_recommendations);
    print_json(&batch)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // Every subcommand records training and prediction counters.
    rec_metrics::init_metrics(rec_metrics::METRICS_PORT_ENV, rec_metrics::DEFAULT_METRICS_PORT);
    let service = RecommendationService::from_env(data_source(cli.data))?;
    match cli.command {
        Command::Train {
            synthetic,
            force,
            months_back,
            report,
        } => {
            let request = RunRequest {
                force: force || synthetic,
                synthetic,
                months_back,
            };
            train(&service, request, report).await
        }
        Command::Schedule { interval_minutes } => schedule(service, interval_minutes).await,
        Command::Predict { request } => predict(&service, request),
        Command::Health => print_json(&service.health()),
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing_subscriber(APP_NAME);
    install_tracing_panic_hook(APP_NAME);

    let cli = Cli::parse();
    info!(run_id = run_id::get(), "rec-trainer starting");

    if let Err(err) = run(cli).await {
        error!(error = %err, "rec-trainer failed");
        std::process::exit(1);
    }
}
