// crates/jobs/src/runner.rs
//! Central job runner that launches and supervises background jobs.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::config::JobsConfig;
use super::context::JobContext;
use super::error::JobsError;
use super::progress::{ProgressReporter, ProgressUpdate};
use super::registry::JobRegistry;
use super::types::{JobId, JobStatus, SubmitOptions};

/// What a unit of work returns: `Err` carries the message recorded on the job.
pub type WorkResult = Result<(), String>;

/// Deadlines past this horizon are clamped to it.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Launches units of work as supervised, time-bounded tokio tasks.
///
/// Every job gets a registry entry, a deadline, a cancellation token derived
/// from the runner's root token, and a progress channel. The outcome of a job
/// is only ever observable through its registry record. Share it via `Arc`.
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    live: Arc<LiveJobs>,
    root: CancellationToken,
    config: JobsConfig,
}

impl JobRunner {
    /// Runner with default configuration and a private registry.
    pub fn new() -> Self {
        Self::with_config(JobsConfig::default())
    }

    pub fn with_config(config: JobsConfig) -> Self {
        Self::with_registry(Arc::new(JobRegistry::new()), config)
    }

    /// Runner writing into an existing registry, e.g. one also held by a query path.
    pub fn with_registry(registry: Arc<JobRegistry>, config: JobsConfig) -> Self {
        Self {
            registry,
            live: Arc::new(LiveJobs::default()),
            root: CancellationToken::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    /// Submit `work` with the configured default timeout.
    pub fn submit_default<F, Fut>(&self, work: F) -> JobId
    where
        F: FnOnce(JobContext, ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        self.submit_with(SubmitOptions::new(), work)
    }

    /// Submit `work`, bounded by `max_duration`, and return its id immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F, Fut>(&self, max_duration: Duration, work: F) -> JobId
    where
        F: FnOnce(JobContext, ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        self.submit_with(SubmitOptions::new().max_duration(max_duration), work)
    }

    pub fn submit_with<F, Fut>(&self, options: SubmitOptions, work: F) -> JobId
    where
        F: FnOnce(JobContext, ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        let id = JobId::new();
        let max_duration = options.max_duration.unwrap_or(self.config.default_timeout);
        let now = Instant::now();
        let deadline = now
            .checked_add(max_duration)
            .unwrap_or_else(|| now + FAR_FUTURE);

        self.registry.put(JobStatus::pending(id));

        let token = self.root.child_token();
        self.live.insert(id, token.clone());

        let span = tracing::info_span!("job", job_id = %id, correlation_id = tracing::field::Empty);
        if let Some(correlation_id) = options.correlation_id.as_deref() {
            span.record("correlation_id", correlation_id);
        }
        tracing::info!(
            parent: &span,
            max_duration_ms = max_duration.as_millis() as u64,
            "Job submitted"
        );

        let ctx = JobContext::new(id, deadline, token.clone(), options.correlation_id);
        let (reporter, events) = ProgressReporter::channel(id);
        let supervisor = Supervisor {
            id,
            max_duration,
            deadline,
            token,
            registry: Arc::clone(&self.registry),
            live: Arc::clone(&self.live),
        };
        tokio::spawn(
            supervisor
                .run(work, ctx, reporter, events)
                .instrument(span),
        );

        id
    }

    /// Snapshot of one job, or [`JobsError::NotFound`].
    pub fn get_status(&self, id: &JobId) -> Result<JobStatus, JobsError> {
        match self.registry.get(id) {
            Some(status) => {
                tracing::debug!(
                    job_id = %id,
                    state = %status.state,
                    progress = status.progress,
                    "Job status read"
                );
                Ok(status)
            }
            None => {
                tracing::debug!(job_id = %id, "Job status requested for unknown job");
                Err(JobsError::not_found(*id))
            }
        }
    }

    /// Snapshots of every pending or processing job.
    pub fn active_jobs(&self) -> Vec<JobStatus> {
        self.registry.active()
    }

    /// Signal a running job to stop. It is recorded as failed.
    ///
    /// Returns false if the job is unknown, already finished, or already cancelled.
    pub fn cancel(&self, id: &JobId) -> bool {
        match self.live.get(id) {
            Some(token) if !token.is_cancelled() => {
                tracing::info!(job_id = %id, "Job cancellation requested");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every job that is still running.
    pub fn shutdown(&self) {
        tracing::info!(running = self.live.len(), "Cancelling all running jobs");
        self.root.cancel();
    }

    /// Drop finished jobs that started more than `older_than` ago.
    pub fn sweep(&self, older_than: Duration) -> usize {
        let removed = self.registry.sweep(older_than);
        if removed > 0 {
            tracing::info!(
                count = removed,
                older_than_secs = older_than.as_secs(),
                "Old jobs removed"
            );
        }
        removed
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation tokens of jobs that have not reached a terminal state.
#[derive(Default)]
struct LiveJobs {
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl LiveJobs {
    fn insert(&self, id: JobId, token: CancellationToken) {
        self.lock().insert(id, token);
    }

    fn get(&self, id: &JobId) -> Option<CancellationToken> {
        self.lock().get(id).cloned()
    }

    fn remove(&self, id: &JobId) {
        self.lock().remove(id);
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-job supervision state. Runs inside the job's tracing span.
struct Supervisor {
    id: JobId,
    max_duration: Duration,
    deadline: Instant,
    token: CancellationToken,
    registry: Arc<JobRegistry>,
    live: Arc<LiveJobs>,
}

impl Supervisor {
    async fn run<F, Fut>(
        self,
        work: F,
        ctx: JobContext,
        reporter: ProgressReporter,
        mut events: mpsc::UnboundedReceiver<ProgressUpdate>,
    ) where
        F: FnOnce(JobContext, ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        // Submitted after shutdown, or cancelled before the supervisor started.
        if self.token.is_cancelled() {
            if self.fail("job cancelled") {
                tracing::warn!("Job cancelled before it started");
            }
            self.settle(&mut events);
            return;
        }

        if self.registry.mutate(&self.id, JobStatus::mark_processing) == Some(true) {
            tracing::debug!("Job processing");
        }

        // Own task so a panic in the work surfaces as a JoinError here.
        let mut work = tokio::spawn(async move { work(ctx, reporter).await }.in_current_span());

        let expiry = tokio::time::sleep_until(self.deadline);
        tokio::pin!(expiry);

        let mut staged_result = None;
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    if self.fail("job cancelled") {
                        tracing::warn!("Job cancelled");
                    }
                    break;
                }
                joined = &mut work => {
                    while let Ok(update) = events.try_recv() {
                        self.apply(update, &mut staged_result);
                    }
                    self.finish(joined, staged_result.take());
                    break;
                }
                _ = &mut expiry => {
                    let message = format!(
                        "job timeout: exceeded maximum duration of {:?}",
                        self.max_duration
                    );
                    if self.fail(&message) {
                        tracing::error!(
                            max_duration_ms = self.max_duration.as_millis() as u64,
                            "Job timed out"
                        );
                    }
                    break;
                }
                event = events.recv(), if events_open => match event {
                    Some(update) => {
                        if self.apply(update, &mut staged_result) {
                            self.settle(&mut events);
                            events_open = false;
                        }
                    }
                    None => events_open = false,
                },
            }
        }

        self.settle(&mut events);
        self.token.cancel();
    }

    /// Apply one progress report. Returns true if it completed the job.
    fn apply(&self, update: ProgressUpdate, staged_result: &mut Option<serde_json::Value>) -> bool {
        let completes = update.completes_job();
        let ProgressUpdate {
            progress,
            estimated_completion,
            result,
        } = update;

        if completes {
            let done = self
                .registry
                .mutate(&self.id, |status| {
                    status.apply_progress(progress, estimated_completion);
                    status.complete(result)
                })
                .unwrap_or(false);
            if done {
                tracing::info!("Job completed by final progress report");
            }
            return done;
        }

        if result.is_some() {
            *staged_result = result;
        }
        let changed = self
            .registry
            .mutate(&self.id, |status| {
                status.apply_progress(progress, estimated_completion)
            })
            .unwrap_or(false);
        if changed {
            tracing::debug!(progress, "Progress updated");
        }
        false
    }

    fn finish(&self, joined: Result<WorkResult, JoinError>, result: Option<serde_json::Value>) {
        match joined {
            Ok(Ok(())) => {
                let done = self
                    .registry
                    .mutate(&self.id, |status| status.complete(result))
                    .unwrap_or(false);
                if done {
                    tracing::info!("Job completed successfully");
                }
            }
            Ok(Err(message)) => {
                if self.fail(&message) {
                    tracing::error!(error = %message, "Job failed");
                }
            }
            Err(err) if err.is_panic() => {
                let payload = panic_message(err.into_panic());
                if self.fail(&format!("panic in background job: {payload}")) {
                    tracing::error!(panic = %payload, "Job panicked");
                }
            }
            Err(err) => {
                if self.fail("job aborted before completion") {
                    tracing::error!(error = %err, "Job task aborted");
                }
            }
        }
    }

    fn fail(&self, message: &str) -> bool {
        self.registry
            .mutate(&self.id, |status| status.fail(message))
            .unwrap_or(false)
    }

    /// The record is terminal: stop taking reports and forget the cancel handle.
    fn settle(&self, events: &mut mpsc::UnboundedReceiver<ProgressUpdate>) {
        events.close();
        self.live.remove(&self.id);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
