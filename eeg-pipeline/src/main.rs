//! eeg-pipeline - EEG analysis job pipeline and time-series importer
//!
//! One-shot command-line front end. Every command opens the pipeline under
//! the resolved root folder, performs its operation and drains background
//! work (execution, validation, imports) before exiting.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use eeg_common::config::{load_toml_config, resolve_root_folder};
use eeg_common::events::PipelineEvent;
use eeg_common::JobStatus;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use eeg_pipeline::models::{AnalysisVariant, JobFilter, Priority};
use eeg_pipeline::services::Submission;
use eeg_pipeline::{Pipeline, PipelineError};

/// Command-line arguments for eeg-pipeline
#[derive(Parser, Debug)]
#[command(name = "eeg-pipeline")]
#[command(about = "EEG analysis job pipeline and time-series importer")]
#[command(version)]
struct Args {
    /// Root folder holding the database and uploads
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "EEG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct SubmitArgs {
    /// Owner (user) id
    #[arg(long)]
    owner: i64,

    /// Patient/subject label, unique per owner
    #[arg(long)]
    subject: String,

    /// urgent, normal or routine
    #[arg(long, default_value = "normal")]
    priority: Priority,

    /// classification or prediction
    #[arg(long, default_value = "classification")]
    variant: AnalysisVariant,

    /// Recording to upload
    file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a recording and create a queued job
    Submit(SubmitArgs),

    /// Start a queued job and wait for it to finish
    Start { job_id: Uuid },

    /// Submit, start and wait in one step
    Analyze(SubmitArgs),

    /// Show a job with its result and file metadata
    Status { job_id: Uuid },

    /// List an owner's jobs, newest first
    List {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },

    /// List an owner's completed jobs with results
    Results {
        #[arg(long)]
        owner: i64,
    },

    /// Cancel a queued or processing job
    Cancel { job_id: Uuid },

    /// Delete a finished job, its result and its stored file
    Delete { job_id: Uuid },

    /// Override a job's status
    SetStatus { job_id: Uuid, status: JobStatus },

    /// Change a job's priority label
    SetPriority { job_id: Uuid, priority: Priority },

    /// Import a recording from the upload root as time-series points
    Import {
        #[arg(long)]
        subject: String,
        file: PathBuf,
    },

    /// Import every s*.csv in a directory (subject = file stem)
    ImportDir { dir: PathBuf },

    /// List time-series subjects
    Subjects,

    /// Query a subject's points, ascending by time
    Points {
        subject: String,
        /// RFC 3339 lower bound (inclusive)
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// RFC 3339 upper bound (inclusive)
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        /// Max points (default 1000, at most 10000)
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Delete a subject and all its points
    Purge { subject: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    info!("Root folder: {}", root_folder.display());

    let pipeline = Pipeline::open(&root_folder, &config)
        .await
        .map_err(reason)
        .context("Failed to open pipeline")?;

    let outcome = run(&pipeline, args.command).await;
    pipeline.shutdown().await;
    outcome
}

async fn run(pipeline: &Pipeline, command: Command) -> Result<()> {
    match command {
        Command::Submit(submit) => {
            let job = pipeline
                .jobs
                .submit(read_submission(submit)?)
                .await
                .map_err(reason)?;
            pipeline.wait_idle().await;
            print_json(&pipeline.jobs.get(job.id).await.map_err(reason)?)
        }
        Command::Start { job_id } => {
            let printer = spawn_progress_printer(pipeline, job_id);
            pipeline.jobs.start(job_id).await.map_err(reason)?;
            pipeline.wait_idle().await;
            printer.abort();
            print_json(&pipeline.jobs.get(job_id).await.map_err(reason)?)
        }
        Command::Analyze(submit) => {
            let job = pipeline
                .jobs
                .submit(read_submission(submit)?)
                .await
                .map_err(reason)?;
            let printer = spawn_progress_printer(pipeline, job.id);
            pipeline.jobs.start(job.id).await.map_err(reason)?;
            pipeline.wait_idle().await;
            printer.abort();
            print_json(&pipeline.jobs.get(job.id).await.map_err(reason)?)
        }
        Command::Status { job_id } => {
            let job = pipeline.jobs.get(job_id).await.map_err(reason)?;
            let metadata = pipeline.jobs.metadata(job_id).await.map_err(reason)?;
            print_json(&serde_json::json!({ "job": job, "metadata": metadata }))
        }
        Command::List {
            owner,
            status,
            priority,
            search,
        } => {
            let filter =
                JobFilter::from_query(status.as_deref(), priority.as_deref(), search.as_deref())?;
            print_json(&pipeline.jobs.list(owner, &filter).await.map_err(reason)?)
        }
        Command::Results { owner } => {
            print_json(&pipeline.jobs.results(owner).await.map_err(reason)?)
        }
        Command::Cancel { job_id } => print_json(&pipeline.jobs.cancel(job_id).await.map_err(reason)?),
        Command::Delete { job_id } => {
            pipeline.jobs.delete(job_id).await.map_err(reason)?;
            print_json(&serde_json::json!({ "deleted": job_id }))
        }
        Command::SetStatus { job_id, status } => print_json(
            &pipeline
                .jobs
                .update_status(job_id, status)
                .await
                .map_err(reason)?,
        ),
        Command::SetPriority { job_id, priority } => print_json(
            &pipeline
                .jobs
                .update_priority(job_id, priority)
                .await
                .map_err(reason)?,
        ),
        Command::Import { subject, file } => {
            let ack = pipeline.importer.import(&file, &subject).map_err(reason)?;
            print_json(&ack)?;
            pipeline.wait_idle().await;
            let count = pipeline.importer.count(&ack.subject_label).await.map_err(reason)?;
            print_json(&serde_json::json!({ "subject_label": ack.subject_label, "points": count }))
        }
        Command::ImportDir { dir } => {
            let results = pipeline.importer.import_directory(&dir).await.map_err(reason)?;
            let summaries: Vec<_> = results
                .into_iter()
                .map(|(subject_label, summary)| {
                    serde_json::json!({ "subject_label": subject_label, "summary": summary })
                })
                .collect();
            print_json(&summaries)
        }
        Command::Subjects => print_json(&pipeline.importer.subjects().await.map_err(reason)?),
        Command::Points {
            subject,
            start,
            end,
            limit,
        } => print_json(
            &pipeline
                .importer
                .points(&subject, start, end, limit)
                .await
                .map_err(reason)?,
        ),
        Command::Purge { subject } => {
            let removed = pipeline.importer.purge(&subject).await.map_err(reason)?;
            print_json(&serde_json::json!({ "subject_label": subject, "points_removed": removed }))
        }
    }
}

fn read_submission(args: SubmitArgs) -> Result<Submission> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("No file name in {}", args.file.display()))?;

    Ok(Submission {
        owner_id: args.owner,
        file_name,
        bytes,
        subject_label: args.subject,
        priority: args.priority,
        variant: args.variant,
    })
}

/// Log progress and status events for one job until aborted
fn spawn_progress_printer(pipeline: &Pipeline, job_id: Uuid) -> tokio::task::JoinHandle<()> {
    let mut rx = pipeline.events().subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.job_id() == Some(job_id) => match event {
                    PipelineEvent::JobProgress { progress, .. } => {
                        info!(job_id = %job_id, progress, "Progress");
                    }
                    PipelineEvent::JobStatusChanged { new_status, .. } => {
                        info!(job_id = %job_id, status = %new_status, "Status");
                    }
                    _ => {}
                },
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Attach the stable reason code to a boundary error
fn reason(e: PipelineError) -> anyhow::Error {
    anyhow!("[{}] {}", e.code(), e)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
