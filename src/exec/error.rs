// ABOUTME: Error types for the command execution engine.
// ABOUTME: Covers failed and timed-out commands, bad addresses, and group aggregation.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("command {argv:?} failed with exit code {exit_code}")]
    CommandFailed {
        argv: Vec<String>,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("command {argv:?} timed out after {elapsed:?}")]
    CommandTimedOut { argv: Vec<String>, elapsed: Duration },

    #[error("invalid deployment address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error("{failed_count} hosts failed with an error. Check the logs above")]
    GroupExecutionFailed { failed_count: usize },

    #[error("command is empty")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker for {host} panicked")]
    WorkerPanicked { host: String },

    #[error("{0}")]
    Other(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_address(input: &str, reason: impl Into<String>) -> Self {
        Error::InvalidAddress {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Wrap an arbitrary message, typically from a `run_function` closure.
    pub fn other(message: impl Into<String>) -> Self {
        Error::Other(message.into())
    }

    /// Exit code of a command that ran to completion but failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::CommandFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::CommandTimedOut { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_failure_message_counts_hosts() {
        let err = Error::GroupExecutionFailed { failed_count: 2 };
        assert_eq!(
            err.to_string(),
            "2 hosts failed with an error. Check the logs above"
        );
    }

    #[test]
    fn exit_code_only_for_failed_commands() {
        let failed = Error::CommandFailed {
            argv: vec!["false".to_string()],
            exit_code: 1,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(failed.exit_code(), Some(1));
        assert!(!failed.is_timeout());

        let timed_out = Error::CommandTimedOut {
            argv: vec!["sleep".to_string(), "10".to_string()],
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(timed_out.exit_code(), None);
        assert!(timed_out.is_timeout());
    }
}
