// crates/cli/src/main.rs
//! Jobsmith command-line driver.
//!
//! Submits a synthetic unit of work to a [`JobRunner`], polls its status and
//! prints every snapshot as one JSON line until the job finishes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use jobsmith_jobs::{
    sweeper, JobContext, JobRunner, JobState, JobsConfig, ProgressReporter, SubmitOptions,
    WorkResult,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobsmith", version, about = "Run and watch supervised background jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a synthetic job and follow it to completion.
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// How the job ends.
    #[arg(long, value_enum, default_value_t = Mode::Ok)]
    mode: Mode,

    /// Number of progress steps.
    #[arg(long, default_value_t = 4)]
    steps: u8,

    /// Delay between steps, in milliseconds.
    #[arg(long, default_value_t = 250)]
    step_ms: u64,

    /// Job timeout in milliseconds. Defaults to JOBSMITH_DEFAULT_TIMEOUT_SECS.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Status poll interval, in milliseconds.
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Correlation id attached to the job's logs.
    #[arg(long)]
    correlation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Finish successfully with a small result.
    Ok,
    /// Return an error after the last step.
    Fail,
    /// Panic halfway through.
    Panic,
    /// Ignore the steps and wait for the deadline.
    Hang,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,jobsmith=info,jobsmith_jobs=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = JobsConfig::from_env().context("loading jobs config")?;

    match cli.command {
        Command::Run(args) => run(config, args).await,
    }
}

async fn run(config: JobsConfig, args: RunArgs) -> Result<()> {
    let runner = Arc::new(JobRunner::with_config(config));
    let stop_sweeper = CancellationToken::new();
    let sweeper = sweeper::spawn(Arc::clone(&runner), stop_sweeper.clone());

    let mut options = SubmitOptions::new();
    if let Some(ms) = args.timeout_ms {
        options = options.max_duration(Duration::from_millis(ms));
    }
    if let Some(id) = args.correlation_id.clone() {
        options = options.correlation_id(id);
    }

    let (mode, steps, step) = (args.mode, args.steps.max(1), Duration::from_millis(args.step_ms));
    let id = runner.submit_with(options, move |ctx, progress| {
        synthetic(ctx, progress, mode, steps, step)
    });
    tracing::info!(job_id = %id, mode = ?mode, steps, "Submitted synthetic job");

    let poll = Duration::from_millis(args.poll_ms.max(1));
    let last = loop {
        let status = runner.get_status(&id)?;
        println!("{}", serde_json::to_string(&status)?);
        if status.is_terminal() {
            break status;
        }
        tokio::time::sleep(poll).await;
    };

    runner.shutdown();
    stop_sweeper.cancel();
    sweeper.await.context("sweeper task")?;

    if last.state == JobState::Failed {
        anyhow::bail!(
            "job {id} failed: {}",
            last.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn synthetic(
    ctx: JobContext,
    progress: ProgressReporter,
    mode: Mode,
    steps: u8,
    step: Duration,
) -> WorkResult {
    tracing::debug!(
        job_id = %ctx.job_id(),
        budget_ms = ctx.remaining().as_millis() as u64,
        "Synthetic job started"
    );

    if mode == Mode::Hang {
        ctx.cancelled().await;
        let overrun = tokio::time::Instant::now().saturating_duration_since(ctx.deadline());
        return Err(format!("stopped {overrun:?} after deadline"));
    }

    for n in 1..=steps {
        if ctx.run_until_cancelled(tokio::time::sleep(step)).await.is_none() {
            return Err("cancelled".to_string());
        }
        if mode == Mode::Panic && n > steps / 2 {
            panic!("synthetic job panicked at step {n}");
        }
        let pct = (u16::from(n) * 100 / u16::from(steps)) as u8;
        let left = chrono::Duration::from_std(step * u32::from(steps - n))
            .unwrap_or_else(|_| chrono::Duration::zero());
        let eta = chrono::Utc::now() + left;
        progress.report(pct.min(99), Some(eta), None);
    }

    tracing::debug!(job_id = %progress.job_id(), steps, "Synthetic job stepped through");
    match mode {
        Mode::Fail => Err(format!("synthetic failure after {steps} steps")),
        _ => {
            progress.report(99, None, Some(serde_json::json!({ "steps": steps })));
            Ok(())
        }
    }
}
