//! Backup job: archive one or many volumes into a fresh archive set.
//!
//! Volumes are processed strictly one after another. A failing volume is
//! logged, counted and skipped; only setup failures (archive set directory,
//! helper image, unreachable runtime) abort the job.

use super::{validate_volume_name, BACKUP_MOUNT, DATA_MOUNT};
use crate::catalog::archives::{archive_file_name, ARCHIVE_SET_FORMAT};
use crate::catalog::VolumeCatalog;
use crate::runtime::{AccessMode, Binding, ContainerRuntime, ImageCache, TaskSpec, BACKUP_LABEL};
use crate::task::TaskRunner;
use crate::utils::errors::{FlintError, Result};
use crate::utils::format::format_bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// An archive file produced for one volume.
#[derive(Debug, Clone)]
pub struct ArchivedVolume {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug)]
pub struct VolumeOutcome {
    pub volume: String,
    pub result: std::result::Result<ArchivedVolume, String>,
}

/// Per-invocation counts, reported to the operator and never persisted.
#[derive(Debug, Default)]
pub struct JobResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Archive set directory, when one was created.
    pub archive_set: Option<PathBuf>,
    pub outcomes: Vec<VolumeOutcome>,
}

impl JobResult {
    fn record(&mut self, volume: &str, result: Result<ArchivedVolume>) {
        self.attempted += 1;
        let result = match result {
            Ok(archive) => {
                self.succeeded += 1;
                Ok(archive)
            }
            Err(e) => {
                self.failed += 1;
                Err(e.to_string())
            }
        };
        self.outcomes.push(VolumeOutcome {
            volume: volume.to_string(),
            result,
        });
    }
}

/// Task spec archiving `volume` into `<set_dir>/<volume>.tar.gz`.
///
/// The volume is mounted read-only; only the archive set directory is writable.
pub fn backup_spec(image: &str, volume: &str, set_dir: &Path) -> TaskSpec {
    TaskSpec {
        image: image.to_string(),
        command: vec![
            "tar".to_string(),
            "czf".to_string(),
            format!("{}/{}", BACKUP_MOUNT, archive_file_name(volume)),
            "-C".to_string(),
            DATA_MOUNT.to_string(),
            ".".to_string(),
        ],
        bindings: vec![
            Binding::volume(volume, DATA_MOUNT, AccessMode::ReadOnly),
            Binding::host(set_dir, BACKUP_MOUNT, AccessMode::ReadWrite),
        ],
    }
}

pub struct BackupJob<'a> {
    runtime: &'a dyn ContainerRuntime,
    images: &'a ImageCache,
    backup_root: PathBuf,
    image: String,
}

impl<'a> BackupJob<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        images: &'a ImageCache,
        backup_root: impl Into<PathBuf>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            images,
            backup_root: backup_root.into(),
            image: image.into(),
        }
    }

    /// Back up every volume labelled for backup.
    pub async fn backup_all(&self) -> Result<JobResult> {
        let volumes = VolumeCatalog::new(self.runtime).list_eligible().await?;
        if volumes.is_empty() {
            warn!("No volumes found with label '{}'", BACKUP_LABEL);
            return Ok(JobResult::default());
        }

        info!("Found {} volumes to backup", volumes.len());
        let names: Vec<String> = volumes.into_iter().map(|v| v.name).collect();
        self.run(&names).await
    }

    /// Back up a single named volume, whether or not it carries the label.
    pub async fn backup_one(&self, volume: &str) -> Result<JobResult> {
        validate_volume_name(volume)?;
        self.run(&[volume.to_string()]).await
    }

    async fn run(&self, volumes: &[String]) -> Result<JobResult> {
        let set_dir = self.create_archive_set()?;
        info!("Backup destination: {}", set_dir.display());

        self.images.ensure(self.runtime, &self.image).await?;

        let runner = TaskRunner::new(self.runtime);
        let mut result = JobResult {
            archive_set: Some(set_dir.clone()),
            ..JobResult::default()
        };

        let total = volumes.len();
        for (i, volume) in volumes.iter().enumerate() {
            info!("[{}/{}] Processing {}", i + 1, total, volume);

            let outcome = self.backup_volume(&runner, volume, &set_dir).await;
            let mut lost_runtime = None;
            match &outcome {
                Ok(archive) => info!(
                    volume = %volume,
                    "Backup completed: {} ({})",
                    archive_file_name(volume),
                    format_bytes(archive.size)
                ),
                Err(FlintError::RuntimeUnavailable(msg)) => {
                    error!(volume = %volume, "Container runtime went away: {}", msg);
                    lost_runtime = Some(msg.clone());
                }
                Err(e) => error!(volume = %volume, "Backup failed: {}", e),
            }
            result.record(volume, outcome);

            if let Some(msg) = lost_runtime {
                log_summary("Backup aborted", &result, &set_dir);
                return Err(FlintError::RuntimeUnavailable(msg));
            }
        }

        log_summary("Backup finished", &result, &set_dir);
        Ok(result)
    }

    /// Create `<root>/<YYYYMMDD_HHMMSS>` and return its absolute path.
    fn create_archive_set(&self) -> Result<PathBuf> {
        let name = chrono::Local::now().format(ARCHIVE_SET_FORMAT).to_string();
        let path = self.backup_root.join(name);

        std::fs::create_dir_all(&path).map_err(|source| FlintError::ArchiveSet {
            path: path.clone(),
            source,
        })?;
        std::fs::canonicalize(&path).map_err(|source| FlintError::ArchiveSet { path, source })
    }

    async fn backup_volume(
        &self,
        runner: &TaskRunner<'_>,
        volume: &str,
        set_dir: &Path,
    ) -> Result<ArchivedVolume> {
        let archive_path = set_dir.join(archive_file_name(volume));
        let spec = backup_spec(&self.image, volume, set_dir);

        let report = match runner.run(&spec).await {
            Ok(report) => report,
            Err(e) => {
                discard_partial(&archive_path);
                if e.is_unavailable() {
                    return Err(FlintError::RuntimeUnavailable(e.to_string()));
                }
                return Err(e.into());
            }
        };
        debug!(volume = %volume, elapsed = ?report.elapsed, "Archive task finished");

        let size = std::fs::metadata(&archive_path)
            .map(|m| m.len())
            .map_err(|source| FlintError::Filesystem {
                path: archive_path.clone(),
                source,
            })?;

        if size == 0 {
            discard_partial(&archive_path);
            return Err(FlintError::Filesystem {
                path: archive_path,
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "archive is empty"),
            });
        }

        Ok(ArchivedVolume {
            path: archive_path,
            size,
        })
    }
}

fn log_summary(headline: &str, result: &JobResult, set_dir: &Path) {
    info!(
        attempted = result.attempted,
        succeeded = result.succeeded,
        failed = result.failed,
        "{}, location: {}",
        headline,
        set_dir.display()
    );
}

/// Remove whatever a failed task left behind so no half-written archive
/// passes for a good one.
fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => warn!("Removed incomplete archive {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove incomplete archive {}: {}", path.display(), e),
    }
}
