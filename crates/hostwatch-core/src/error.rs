//! Error types.
//!
//! The port engine itself never fails (malformed input is skipped, tool
//! failures degrade to an empty collection). These enums cover the places
//! where a caller does need to know what went wrong.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for [`crate::Monitor`] operations.
#[derive(Debug, Error)]
pub enum HostwatchError {
    #[error("invalid electricity price {0}: must be a finite number greater than zero")]
    InvalidPrice(f64),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    JobControl(#[from] JobControlError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Failure to run an external tool.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command '{program}' not found")]
    NotFound { program: String },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("'{program}' timed out after {timeout_ms}ms")]
    TimedOut { program: String, timeout_ms: u64 },
}

impl CommandError {
    pub fn program(&self) -> &str {
        match self {
            Self::NotFound { program }
            | Self::Spawn { program, .. }
            | Self::Failed { program, .. }
            | Self::TimedOut { program, .. } => program,
        }
    }
}

/// Failure to load or validate a [`crate::MonitorConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Failure to signal a training job.
#[derive(Debug, Error)]
pub enum JobControlError {
    #[error("pid {0} is not a tracked training job")]
    NotTracked(u32),

    #[error("no such process: {0}")]
    NoSuchProcess(u32),

    #[error("permission denied signalling pid {0}")]
    PermissionDenied(u32),

    #[error("job control is not supported on this platform")]
    Unsupported,

    #[error("failed to signal pid {pid}: {source}")]
    Os {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_exposes_program() {
        let err = CommandError::NotFound {
            program: "ss".into(),
        };
        assert_eq!(err.program(), "ss");
        assert_eq!(err.to_string(), "command 'ss' not found");
    }

    #[test]
    fn job_control_error_converts_into_top_level() {
        let err: HostwatchError = JobControlError::NotTracked(42).into();
        assert_eq!(err.to_string(), "pid 42 is not a tracked training job");
    }
}
