// crates/jobs/src/context.rs
//! Deadline-bound cancellation context handed to every unit of work.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::JobId;

/// Execution context of one job.
///
/// The cancellation signal fires when the job's deadline passes, when the
/// job is cancelled through the runner, or when supervision ends. Work is
/// expected to watch it and stop on its own; nothing preempts it.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: JobId,
    deadline: Instant,
    token: CancellationToken,
    correlation_id: Option<String>,
}

impl JobContext {
    pub(crate) fn new(
        job_id: JobId,
        deadline: Instant,
        token: CancellationToken,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            job_id,
            deadline,
            token,
            correlation_id,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the job should stop.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Run `fut` unless the job is cancelled first; `None` on cancellation.
    pub async fn run_until_cancelled<F: std::future::Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }
}
