//! Error types for runner backends

use renex_core::Batch;
use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Outcomes a runner reports besides success
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The job could not be started
    #[error("failed to launch job {job}: {reason}")]
    Launch {
        /// Backend job name
        job: String,
        reason: String,
    },

    /// The job state could not be determined
    #[error("failed to probe job {job}: {reason}")]
    Probe {
        /// Backend job name
        job: String,
        reason: String,
    },

    /// Backend housekeeping failed
    #[error("cleanup failed: {0}")]
    Cleanup(String),

    /// Runner configuration is unusable
    #[error("invalid runner configuration: {0}")]
    Config(String),
}

impl RunnerError {
    /// Launch error for `batch`
    pub fn launch(batch: &Batch, reason: impl Into<String>) -> Self {
        Self::Launch {
            job: batch.job_name(),
            reason: reason.into(),
        }
    }

    /// Probe error for `batch`
    pub fn probe(batch: &Batch, reason: impl Into<String>) -> Self {
        Self::Probe {
            job: batch.job_name(),
            reason: reason.into(),
        }
    }

    /// Check if this error came from a probe
    pub fn is_probe(&self) -> bool {
        matches!(self, Self::Probe { .. })
    }
}
