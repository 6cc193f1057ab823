//! Retention sweeper: deletes archive sets older than a number of days.

use crate::utils::errors::{FlintError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// What one sweep did.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub removed: Vec<String>,
    /// Directories that were due for removal but could not be deleted.
    pub failed: Vec<(String, String)>,
}

impl SweepReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

pub struct RetentionSweeper {
    root: PathBuf,
}

impl RetentionSweeper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Remove every archive set last modified more than `keep_days` ago.
    pub fn sweep(&self, keep_days: u32) -> Result<SweepReport> {
        self.sweep_at(keep_days, SystemTime::now())
    }

    /// [`sweep`](Self::sweep) against a fixed clock.
    pub fn sweep_at(&self, keep_days: u32, now: SystemTime) -> Result<SweepReport> {
        let keep = Duration::from_secs(u64::from(keep_days) * SECS_PER_DAY);
        let cutoff = now.checked_sub(keep).unwrap_or(SystemTime::UNIX_EPOCH);

        let mut report = SweepReport::default();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No backups found in {}", self.root.display());
                return Ok(report);
            }
            Err(source) => {
                return Err(FlintError::Filesystem {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(meta) = entry.metadata() else {
                debug!(entry = %name, "Skipping unreadable entry");
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            let Ok(modified) = meta.modified() else {
                continue;
            };
            if modified >= cutoff {
                continue;
            }

            match remove_archive_set(&entry.path()) {
                Ok(()) => {
                    info!("Removed: {}", name);
                    report.removed.push(name);
                }
                Err(e) => {
                    error!("Removing {}: {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report.removed.sort();
        Ok(report)
    }
}

fn remove_archive_set(path: &Path) -> std::io::Result<()> {
    std::fs::remove_dir_all(path)
}
