//! Archive catalog: enumerates archive sets under the backup root.
//!
//! Layout on disk:
//!
//! ```text
//! <backup root>/
//!   20240105_031500/        archive set, one per backup run
//!     plex.tar.gz           archive file, one per volume
//!     sonarr.tar.gz
//! ```

use crate::utils::errors::{FlintError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension of every archive file.
pub const ARCHIVE_EXT: &str = ".tar.gz";

/// `strftime` pattern of archive set directory names (local time).
pub const ARCHIVE_SET_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File name of the archive holding `volume`.
pub fn archive_file_name(volume: &str) -> String {
    format!("{}{}", volume, ARCHIVE_EXT)
}

/// One archive set that holds at least one archive file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSetSummary {
    pub name: String,
    pub path: PathBuf,
    pub file_count: usize,
    pub total_bytes: u64,
}

pub struct ArchiveCatalog {
    root: PathBuf,
}

impl ArchiveCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Summaries of every archive set, sorted by name (oldest first).
    ///
    /// A missing root yields an empty list. Directories without any
    /// `*.tar.gz` file are left out.
    pub fn list(&self) -> Result<Vec<ArchiveSetSummary>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(FlintError::Filesystem {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut summaries: Vec<ArchiveSetSummary> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| summarize(&e.path()))
            .collect();

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}

fn summarize(dir: &Path) -> Option<ArchiveSetSummary> {
    let mut file_count = 0usize;
    let mut total_bytes = 0u64;

    let archives = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(ARCHIVE_EXT));

    for entry in archives {
        file_count += 1;
        total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
    }

    if file_count == 0 {
        return None;
    }

    Some(ArchiveSetSummary {
        name: dir.file_name()?.to_string_lossy().into_owned(),
        path: dir.to_path_buf(),
        file_count,
        total_bytes,
    })
}
