// crates/jobs/src/types.rs
//! Types for the background job system.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobsError;

/// Highest progress value a job can report.
pub const MAX_PROGRESS: u8 = 100;

/// Unique identifier for a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = JobsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| JobsError::InvalidJobId {
                value: s.to_string(),
            })
    }
}

/// Lifecycle state of a background job.
///
/// Transitions only move forward: `Pending -> Processing -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// `Completed` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time record of one job.
///
/// Values handed out by the registry are owned copies; nothing the runner
/// does afterwards is visible through them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub progress: u8,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl JobStatus {
    /// A freshly submitted job, started now.
    pub fn pending(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Pending,
            progress: 0,
            start_time: Utc::now(),
            completion_time: None,
            estimated_completion: None,
            error: None,
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// `Pending -> Processing`. Returns false if the job already left `Pending`.
    pub fn mark_processing(&mut self) -> bool {
        if self.state != JobState::Pending {
            return false;
        }
        self.state = JobState::Processing;
        true
    }

    /// Record a progress report. Ignored once the job is terminal.
    ///
    /// Returns true when the stored progress value changed.
    pub fn apply_progress(
        &mut self,
        progress: u8,
        estimated_completion: Option<DateTime<Utc>>,
    ) -> bool {
        if self.is_terminal() {
            return false;
        }
        let previous = self.progress;
        self.progress = progress.min(MAX_PROGRESS);
        if estimated_completion.is_some() {
            self.estimated_completion = estimated_completion;
        }
        previous != self.progress
    }

    /// Transition to `Completed` with progress forced to 100.
    ///
    /// Returns false (and changes nothing) if the job is already terminal.
    pub fn complete(&mut self, result: Option<serde_json::Value>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = JobState::Completed;
        self.progress = MAX_PROGRESS;
        self.result = result;
        self.error = None;
        self.completion_time = Some(Utc::now());
        true
    }

    /// Transition to `Failed` with the given message.
    ///
    /// Returns false (and changes nothing) if the job is already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.result = None;
        self.completion_time = Some(Utc::now());
        true
    }
}

/// Options accepted by [`JobRunner::submit_with`](crate::JobRunner::submit_with).
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Maximum wall-clock time the job may run. `None` uses the runner default.
    pub max_duration: Option<std::time::Duration>,
    /// Caller-supplied id (e.g. an HTTP request id) carried into logs and the job context.
    pub correlation_id: Option<String>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_duration(mut self, max_duration: std::time::Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}
