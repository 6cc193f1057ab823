//! Error types for flint.
//!
//! Three layers: [`RuntimeError`] is what the container-runtime client
//! raises, [`TaskError`] classifies where an execution task broke, and
//! [`FlintError`] is what jobs and commands surface to the operator.

use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to the container runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("{op} failed (exit code {code:?}): {stderr}")]
    Command {
        op: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected runtime output: {0}")]
    Parse(String),
}

/// Failure of one execution task, tagged with the lifecycle step that broke.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("creating task container: {0}")]
    CreateFailed(#[source] RuntimeError),

    #[error("starting task container: {0}")]
    StartFailed(#[source] RuntimeError),

    #[error("waiting for task container: {0}")]
    WaitFailed(#[source] RuntimeError),

    #[error("task exited with code {0}")]
    NonZeroExit(i64),
}

impl TaskError {
    /// True when the runtime itself could not be reached, as opposed to a
    /// single task misbehaving.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            TaskError::CreateFailed(RuntimeError::Unavailable(_))
                | TaskError::StartFailed(RuntimeError::Unavailable(_))
                | TaskError::WaitFailed(RuntimeError::Unavailable(_))
        )
    }
}

#[derive(Error, Debug)]
pub enum FlintError {
    #[error("cannot reach container runtime: {0}")]
    RuntimeUnavailable(String),

    #[error("pulling image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("runtime error: {0}")]
    Runtime(RuntimeError),

    #[error("backup file not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error("creating backup directory {}: {source}", .path.display())]
    ArchiveSet {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid volume name: {0:?}")]
    InvalidVolumeName(String),

    #[error("{}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RuntimeError> for FlintError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Unavailable(msg) => FlintError::RuntimeUnavailable(msg),
            other => FlintError::Runtime(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlintError>;
