// crates/jobs/src/lib.rs
//! Background job system for long-running async tasks.
//!
//! Provides:
//! - `JobRunner`: launches, supervises and times out units of work
//! - `JobRegistry`: thread-safe table of job status snapshots
//! - `ProgressReporter` / `JobContext`: what every unit of work receives
//! - `sweeper`: periodic removal of finished jobs

pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod sweeper;
pub mod types;

pub use config::JobsConfig;
pub use context::JobContext;
pub use error::JobsError;
pub use progress::{ProgressReporter, ProgressUpdate};
pub use registry::JobRegistry;
pub use runner::{JobRunner, WorkResult};
pub use types::{JobId, JobState, JobStatus, SubmitOptions, MAX_PROGRESS};
