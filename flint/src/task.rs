//! Execution task: one create → start → wait → remove cycle of a short-lived
//! container running a single command against mounted paths.
//!
//! The container is always removed once it has been created, whatever
//! happens in between. A removal failure is logged and never replaces the
//! result of the run.

use crate::runtime::{ContainerRuntime, TaskSpec};
use crate::utils::errors::TaskError;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lifecycle of a task container. `Removed` is reached on every path once
/// `Created` has been.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Started,
    Exited(i64),
    Removed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Created => write!(f, "created"),
            TaskState::Started => write!(f, "started"),
            TaskState::Exited(code) => write!(f, "exited({})", code),
            TaskState::Removed => write!(f, "removed"),
        }
    }
}

/// Outcome of a task whose command exited with status 0.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub container_id: String,
    pub exit_code: i64,
    pub elapsed: Duration,
}

/// Runs execution tasks against a runtime, one at a time.
pub struct TaskRunner<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> TaskRunner<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Run `spec` to completion and release its container.
    ///
    /// Blocks until the command exits; there is no timeout.
    pub async fn run(&self, spec: &TaskSpec) -> Result<TaskReport, TaskError> {
        let started_at = Instant::now();

        let id = self
            .runtime
            .create_container(spec)
            .await
            .map_err(TaskError::CreateFailed)?;
        let sources: Vec<String> = spec.bindings.iter().map(|b| b.source.to_string()).collect();
        debug!(
            container = %id,
            image = %spec.image,
            sources = %sources.join(","),
            state = %TaskState::Created,
            "Task container transition"
        );

        let outcome = self.drive(&id).await;

        match self.runtime.remove_container(&id).await {
            Ok(()) => debug!(container = %id, state = %TaskState::Removed, "Task container transition"),
            Err(e) => warn!(container = %id, error = %e, "Failed to remove task container"),
        }

        let exit_code = outcome?;
        Ok(TaskReport {
            container_id: id,
            exit_code,
            elapsed: started_at.elapsed(),
        })
    }

    /// Start and wait; never removes.
    async fn drive(&self, id: &str) -> Result<i64, TaskError> {
        self.runtime
            .start_container(id)
            .await
            .map_err(TaskError::StartFailed)?;
        debug!(container = %id, state = %TaskState::Started, "Task container transition");

        let code = self
            .runtime
            .wait_container(id)
            .await
            .map_err(TaskError::WaitFailed)?;
        debug!(container = %id, state = %TaskState::Exited(code), "Task container transition");

        if code == 0 {
            Ok(code)
        } else {
            Err(TaskError::NonZeroExit(code))
        }
    }
}
