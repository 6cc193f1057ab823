//! Container runtime abstraction.
//!
//! Jobs never talk to Docker directly: they receive a `&dyn ContainerRuntime`
//! acquired once per CLI invocation. [`docker::DockerCli`] is the production
//! implementation.

pub mod docker;
pub mod image;

#[cfg(test)]
pub(crate) mod fake;

use crate::utils::errors::RuntimeError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub use docker::DockerCli;
pub use image::ImageCache;

/// Label marking a volume as eligible for batch backup.
pub const BACKUP_LABEL: &str = "backup.enable=true";

/// A named storage volume owned by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub labels: BTreeMap<String, String>,
}

impl Volume {
    /// Check a `key=value` (or bare `key`) label selector against this volume.
    pub fn matches_label(&self, selector: &str) -> bool {
        match selector.split_once('=') {
            Some((key, value)) => self.labels.get(key).map(String::as_str) == Some(value),
            None => self.labels.contains_key(selector),
        }
    }
}

/// Whether a binding may be mutated by the task command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Where a binding's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindSource {
    Volume(String),
    HostPath(PathBuf),
}

impl fmt::Display for BindSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindSource::Volume(name) => write!(f, "volume:{}", name),
            BindSource::HostPath(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Mapping of a volume or host path into the task container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub source: BindSource,
    pub target: String,
    pub mode: AccessMode,
}

impl Binding {
    pub fn volume(name: impl Into<String>, target: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            source: BindSource::Volume(name.into()),
            target: target.into(),
            mode,
        }
    }

    pub fn host(path: impl Into<PathBuf>, target: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            source: BindSource::HostPath(path.into()),
            target: target.into(),
            mode,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == AccessMode::ReadOnly
    }
}

/// Everything needed to create one short-lived task container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub image: String,
    pub command: Vec<String>,
    pub bindings: Vec<Binding>,
}

/// One progress line of an image pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullEvent {
    pub status: String,
}

/// Pull progress; must be consumed to the end before the pull is complete.
pub type PullStream = BoxStream<'static, Result<PullEvent, RuntimeError>>;

/// Operations flint needs from the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Verify the runtime is reachable.
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn image_exists(&self, reference: &str) -> Result<bool, RuntimeError>;

    /// Start pulling an image. The pull is finished only once the returned
    /// stream yields `None`.
    async fn pull_image(&self, reference: &str) -> Result<PullStream, RuntimeError>;

    /// List volumes, optionally filtered by a `key=value` label selector.
    async fn list_volumes(&self, label: Option<&str>) -> Result<Vec<Volume>, RuntimeError>;

    /// Create a volume. Succeeds when the volume already exists.
    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError>;

    /// Create (but do not start) a task container, returning its id.
    async fn create_container(&self, spec: &TaskSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Block until the container is no longer running and return its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError>;

    /// Remove the container, stopping it first if it is still running.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
}
