// crates/jobs/src/sweeper.rs
//! Periodic removal of finished jobs.
//!
//! Runs on a fixed `tokio::time::interval` and stops when its
//! [`CancellationToken`] fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::JobsConfig;
use crate::runner::JobRunner;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Run the sweep loop until `cancel` is triggered.
///
/// Each tick drops terminal jobs that started more than `retention` ago.
/// The first tick fires immediately. An interval below one millisecond is
/// raised to one millisecond.
pub async fn run(
    runner: Arc<JobRunner>,
    interval: Duration,
    retention: Duration,
    cancel: CancellationToken,
) {
    let interval = interval.max(MIN_INTERVAL);
    tracing::info!(
        interval_secs = interval.as_secs(),
        retention_secs = retention.as_secs(),
        "Job sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                let removed = runner.sweep(retention);
                if removed == 0 {
                    tracing::debug!(remaining = runner.registry().len(), "Job sweep: nothing to remove");
                }
            }
        }
    }
}

/// Spawn [`run`] using the runner's configured interval and retention.
pub fn spawn(runner: Arc<JobRunner>, cancel: CancellationToken) -> JoinHandle<()> {
    let JobsConfig {
        sweep_interval,
        retention,
        ..
    } = runner.config().clone();
    tokio::spawn(run(runner, sweep_interval, retention, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobId, JobState, JobStatus};

    fn finished_long_ago() -> JobStatus {
        let mut status = JobStatus::pending(JobId::new());
        status.state = JobState::Completed;
        status.start_time = chrono::Utc::now() - chrono::Duration::hours(3);
        status
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_on_each_tick() {
        let runner = Arc::new(JobRunner::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&runner),
            Duration::from_secs(60),
            Duration::from_secs(3600),
            cancel.clone(),
        ));

        let first = finished_long_ago();
        runner.registry().put(first.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(runner.registry().get(&first.id).is_none());

        let second = finished_long_ago();
        runner.registry().put(second.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(runner.registry().get(&second.id).is_some());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(runner.registry().get(&second.id).is_none());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_keeps_running_jobs() {
        let runner = Arc::new(JobRunner::new());
        let mut running = finished_long_ago();
        running.state = JobState::Processing;
        runner.registry().put(running.clone());

        let cancel = CancellationToken::new();
        let handle = spawn(Arc::clone(&runner), cancel.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(runner.registry().get(&running.id).is_some());
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let runner = Arc::new(JobRunner::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&runner),
            Duration::ZERO,
            Duration::from_secs(3600),
            cancel.clone(),
        ));

        let old = finished_long_ago();
        runner.registry().put(old.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(runner.registry().get(&old.id).is_none());

        cancel.cancel();
        handle.await.unwrap();
    }
}
