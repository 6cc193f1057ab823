//! Jobs drive execution tasks on behalf of a CLI command.

pub mod backup;
pub mod restore;

pub use backup::{ArchivedVolume, BackupJob, JobResult, VolumeOutcome};
pub use restore::{RestoreJob, RestoreOutcome, RestoreRequest};

use crate::utils::errors::{FlintError, Result};

/// Mount point of the volume inside task containers.
pub(crate) const DATA_MOUNT: &str = "/data";

/// Mount point of the archive directory inside task containers.
pub(crate) const BACKUP_MOUNT: &str = "/backup";

/// Reject names that the runtime would refuse or that would escape the
/// archive set directory once turned into `<name>.tar.gz`.
pub fn validate_volume_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_first = chars.next().map_or(false, |c| c.is_ascii_alphanumeric());
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid_first && valid_rest {
        Ok(())
    } else {
        Err(FlintError::InvalidVolumeName(name.to_string()))
    }
}
