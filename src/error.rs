// ABOUTME: Application-wide error types for fleetrun.
// ABOUTME: Wraps engine errors alongside inventory and CLI failures.

use std::path::PathBuf;
use thiserror::Error;

use crate::exec;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("inventory file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown machine: {0}")]
    UnknownMachine(String),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Exec(#[from] exec::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
