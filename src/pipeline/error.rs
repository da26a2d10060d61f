//! Pipeline-specific error types.
//!
//! Errors are split by the phase that raises them:
//!
//! - [`ConfigError`]: raised while registering or resolving jobs. Always fatal.
//! - [`PortError`]: raised by the port store on lookup.
//! - [`JobError`]: returned by a job body from its main operation.
//! - [`RunError`]: the only errors that end a run early.

use crate::pipeline::port::PortKey;
use thiserror::Error;

/// Build-time wiring and parameter errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid parameter for job '{job}': {message}")]
    InvalidParameter { job: String, message: String },

    #[error("Job name '{0}' already registered with a different descriptor")]
    NameCollision(String),

    #[error("Port {port} is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        port: PortKey,
        first: String,
        second: String,
    },

    #[error("Job '{job}' consumes port {port} which no job produces")]
    MissingProducer { job: String, port: PortKey },

    #[error("Same-wave cycle between jobs: {}", jobs.join(" -> "))]
    Cycle { jobs: Vec<String> },

    #[error("Pyramid level {level} is not available: {message}")]
    Level { level: String, message: String },

    #[error("Job '{job}' declares no outputs")]
    NoOutputs { job: String },
}

/// Port store lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("Port {0} was never registered")]
    NotFound(PortKey),

    #[error("Port {key} has {available} wave(s) of history, offset {requested} requested")]
    HistoryUnavailable {
        key: PortKey,
        requested: u32,
        available: usize,
    },

    #[error("Port {0} is being written by its producer this wave")]
    WriteInProgress(PortKey),
}

/// Failure returned from a job's main operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error("Input {0} is not valid this wave")]
    InvalidInput(PortKey),

    #[error("Buffer mismatch on {key}: {message}")]
    BufferMismatch { key: PortKey, message: String },

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

impl JobError {
    /// Warm-up condition: the job simply has nothing to do yet.
    pub fn is_history_unavailable(&self) -> bool {
        matches!(self, JobError::Port(PortError::HistoryUnavailable { .. }))
    }
}

/// Errors that terminate [`Pipeline::run`](crate::pipeline::Pipeline::run).
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Job '{job}' referenced unregistered port {port} on wave {wave}")]
    PortNotFound {
        job: String,
        port: PortKey,
        wave: u64,
    },

    #[error("KPI export failed: {0}")]
    KpiExport(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::level::PyramidLevel;

    #[test]
    fn test_cycle_display_lists_jobs() {
        let err = ConfigError::Cycle {
            jobs: vec!["A L0".to_string(), "B L0".to_string()],
        };
        assert_eq!(err.to_string(), "Same-wave cycle between jobs: A L0 -> B L0");
    }

    #[test]
    fn test_job_error_classification() {
        let key = PortKey::new("RAW", PyramidLevel::L0);
        let warmup = JobError::from(PortError::HistoryUnavailable {
            key: key.clone(),
            requested: 2,
            available: 1,
        });
        assert!(warmup.is_history_unavailable());
        assert!(!JobError::from(PortError::NotFound(key)).is_history_unavailable());
        assert!(!JobError::Failed("boom".into()).is_history_unavailable());
    }
}
