// crates/jobs/src/progress.rs
//! Progress reporting from a unit of work to its supervisor.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::types::{JobId, MAX_PROGRESS};

/// One progress report, as queued for the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub progress: u8,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
}

impl ProgressUpdate {
    /// A report carrying a result at 100% finishes the job right away.
    pub(crate) fn completes_job(&self) -> bool {
        self.result.is_some() && self.progress >= MAX_PROGRESS
    }
}

/// Handle given to a unit of work for reporting progress.
///
/// Cheap to clone and usable from synchronous code. Reports are applied to
/// the registry by the job's supervisor in the order they were sent. Once
/// the job reaches a terminal state the channel is closed and every further
/// report is dropped.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressReporter {
    pub(crate) fn channel(job_id: JobId) -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { job_id, tx }, rx)
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Report progress, an optional completion estimate and an optional result.
    ///
    /// Returns false if the job is already finished and the report was dropped.
    pub fn report(
        &self,
        progress: u8,
        estimated_completion: Option<DateTime<Utc>>,
        result: Option<serde_json::Value>,
    ) -> bool {
        self.tx
            .send(ProgressUpdate {
                progress,
                estimated_completion,
                result,
            })
            .is_ok()
    }

    /// Shorthand for a bare percentage.
    pub fn set_progress(&self, progress: u8) -> bool {
        self.report(progress, None, None)
    }

    /// Report 100% together with the job's result.
    pub fn finish_with(&self, result: serde_json::Value) -> bool {
        self.report(MAX_PROGRESS, None, Some(result))
    }

    /// True once the supervisor stopped accepting reports.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
