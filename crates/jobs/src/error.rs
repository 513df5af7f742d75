// crates/jobs/src/error.rs
use thiserror::Error;

use crate::types::JobId;

/// Errors returned synchronously by the job system.
///
/// Failures of the work itself never show up here; they are recorded on the
/// job's [`JobStatus`](crate::JobStatus).
#[derive(Debug, Error)]
pub enum JobsError {
    #[error("Job not found: {id}")]
    NotFound { id: JobId },

    #[error("Invalid job id: {value}")]
    InvalidJobId { value: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidConfig { key: &'static str, value: String },
}

impl JobsError {
    pub fn not_found(id: JobId) -> Self {
        Self::NotFound { id }
    }

    /// True for the "never submitted or already swept" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
