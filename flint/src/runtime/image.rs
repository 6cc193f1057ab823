//! Runtime image cache: makes sure the helper image exists before tasks use it.

use super::ContainerRuntime;
use crate::utils::errors::{FlintError, Result, RuntimeError};
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info};

/// Tracks which image references are known to be present for this invocation.
#[derive(Debug, Default)]
pub struct ImageCache {
    ensured: Mutex<HashSet<String>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_ensured(&self, reference: &str) -> bool {
        self.ensured
            .lock()
            .map(|set| set.contains(reference))
            .unwrap_or(false)
    }

    fn mark_ensured(&self, reference: &str) {
        if let Ok(mut set) = self.ensured.lock() {
            set.insert(reference.to_string());
        }
    }

    /// Make `reference` resolvable locally, pulling it if needed.
    ///
    /// A pull only counts as finished once its progress stream is exhausted,
    /// so the stream is always drained here, never handed back to the caller.
    pub async fn ensure(&self, runtime: &dyn ContainerRuntime, reference: &str) -> Result<()> {
        if self.is_ensured(reference) {
            debug!(image = %reference, "Image already ensured");
            return Ok(());
        }

        let present = runtime
            .image_exists(reference)
            .await
            .map_err(|e| pull_error(reference, e))?;

        if !present {
            info!(image = %reference, "Pulling image");
            let mut events = runtime
                .pull_image(reference)
                .await
                .map_err(|e| pull_error(reference, e))?;

            let mut lines = 0usize;
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| pull_error(reference, e))?;
                debug!(image = %reference, status = %event.status, "Pull progress");
                lines += 1;
            }
            info!(image = %reference, lines, "Image pulled");
        }

        self.mark_ensured(reference);
        Ok(())
    }
}

fn pull_error(reference: &str, source: RuntimeError) -> FlintError {
    match source {
        RuntimeError::Unavailable(msg) => FlintError::RuntimeUnavailable(msg),
        source => FlintError::ImagePull {
            image: reference.to_string(),
            source,
        },
    }
}
