//! Health checker error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that abandon a check cycle. Nothing from the cycle is committed.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to read device registry: {0}")]
    Registry(#[source] fleetpulse_state::StateError),

    #[error("failed to commit cycle: {0}")]
    Commit(#[source] fleetpulse_state::StateError),

    #[error("device check task failed: {0}")]
    Task(String),
}

/// Errors raised when arming a scheduled job.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid interval {interval:?} for job {job_id}: must be greater than zero")]
    InvalidInterval { job_id: String, interval: Duration },

    #[error("job id must not be empty")]
    EmptyJobId,
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
