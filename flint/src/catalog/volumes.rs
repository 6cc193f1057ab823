//! Volume catalog: which volumes are eligible for batch backup.

use crate::runtime::{ContainerRuntime, Volume, BACKUP_LABEL};
use crate::utils::errors::Result;
use tracing::debug;

pub struct VolumeCatalog<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> VolumeCatalog<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Volumes labelled `backup.enable=true`, sorted by name.
    ///
    /// An empty list means nothing is marked; a query failure is an error.
    pub async fn list_eligible(&self) -> Result<Vec<Volume>> {
        let mut volumes = self.runtime.list_volumes(Some(BACKUP_LABEL)).await?;
        volumes.retain(|v| v.matches_label(BACKUP_LABEL));
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = volumes.len(), "Listed eligible volumes");
        Ok(volumes)
    }
}
