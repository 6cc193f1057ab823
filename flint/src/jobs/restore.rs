//! Restore job: replace a volume's contents with an archive.
//!
//! The task clears the volume and then extracts into it. The two steps are
//! not atomic: if the task dies halfway, the volume is left empty or
//! partially populated and the restore has to be run again.

use super::{validate_volume_name, BACKUP_MOUNT, DATA_MOUNT};
use crate::catalog::archives::ARCHIVE_EXT;
use crate::runtime::{AccessMode, Binding, ContainerRuntime, ImageCache, TaskSpec};
use crate::task::TaskRunner;
use crate::ui::Confirm;
use crate::utils::errors::{FlintError, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub archive: PathBuf,
    /// Target volume; derived from the archive name when absent.
    pub volume: Option<String>,
    /// Skip the confirmation prompt.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { volume: String },
    /// The operator said no. Nothing was changed.
    Declined { volume: String },
}

/// Volume name for an archive: its file name minus one trailing `.tar.gz`.
pub fn default_volume_name(archive: &Path) -> Result<String> {
    let base = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| FlintError::InvalidVolumeName(archive.display().to_string()))?;
    Ok(base.strip_suffix(ARCHIVE_EXT).unwrap_or(&base).to_string())
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Task spec wiping `volume` and extracting `<archive_dir>/<archive_name>` into it.
///
/// The volume is mounted read-write; the archive directory read-only.
pub fn restore_spec(image: &str, volume: &str, archive_dir: &Path, archive_name: &str) -> TaskSpec {
    let archive_in_task = shell_quote(&format!("{}/{}", BACKUP_MOUNT, archive_name));
    let script = format!(
        "find {data} -mindepth 1 -delete && tar xzf {archive} -C {data}",
        data = DATA_MOUNT,
        archive = archive_in_task,
    );

    TaskSpec {
        image: image.to_string(),
        command: vec!["sh".to_string(), "-c".to_string(), script],
        bindings: vec![
            Binding::volume(volume, DATA_MOUNT, AccessMode::ReadWrite),
            Binding::host(archive_dir, BACKUP_MOUNT, AccessMode::ReadOnly),
        ],
    }
}

pub struct RestoreJob<'a> {
    runtime: &'a dyn ContainerRuntime,
    images: &'a ImageCache,
    confirm: &'a dyn Confirm,
    image: String,
}

impl<'a> RestoreJob<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        images: &'a ImageCache,
        confirm: &'a dyn Confirm,
        image: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            images,
            confirm,
            image: image.into(),
        }
    }

    pub async fn restore(&self, request: &RestoreRequest) -> Result<RestoreOutcome> {
        // Checked before prompting so nobody confirms an impossible restore.
        let archive = locate_archive(&request.archive)?;

        let volume = match &request.volume {
            Some(name) => name.clone(),
            None => default_volume_name(&archive)?,
        };
        validate_volume_name(&volume)?;

        warn!("This will REPLACE all data in volume: {}", volume);
        if !self.confirm.confirm_yes_no("Are you sure?", request.force) {
            info!("Restore cancelled");
            return Ok(RestoreOutcome::Declined { volume });
        }

        info!("Restoring volume: {} from {}", volume, archive.display());

        let (archive_dir, archive_name) = split_archive_path(&archive)?;

        self.runtime.create_volume(&volume).await?;
        self.images.ensure(self.runtime, &self.image).await?;

        let spec = restore_spec(&self.image, &volume, archive_dir, &archive_name);
        if let Err(e) = TaskRunner::new(self.runtime).run(&spec).await {
            if e.is_unavailable() {
                return Err(FlintError::RuntimeUnavailable(e.to_string()));
            }
            error!(
                volume = %volume,
                "Restore did not complete; the volume may be empty or partially restored. Run the restore again."
            );
            return Err(e.into());
        }

        info!("Restore completed: {}", volume);
        Ok(RestoreOutcome::Restored { volume })
    }
}

/// Absolute path of an existing archive file.
fn locate_archive(path: &Path) -> Result<PathBuf> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(FlintError::ArchiveNotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FlintError::ArchiveNotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(FlintError::Filesystem {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    std::fs::canonicalize(path).map_err(|source| FlintError::Filesystem {
        path: path.to_path_buf(),
        source,
    })
}

fn split_archive_path(archive: &Path) -> Result<(&Path, String)> {
    let dir = archive
        .parent()
        .ok_or_else(|| FlintError::ArchiveNotFound(archive.to_path_buf()))?;
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| FlintError::ArchiveNotFound(archive.to_path_buf()))?;
    Ok((dir, name))
}
