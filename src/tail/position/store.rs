// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::json_file::{atomic_write, load_offsets};
use crate::tail::error::{Error, Result};

/// File name to consumed byte offset
pub type OffsetMap = HashMap<String, u64>;

pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5);

/// Shared handle to the offset map and its backing file.
///
/// Clones share the same map. Each operation takes the lock for its own
/// duration only; no operation nests locks or does disk I/O under the lock.
#[derive(Clone, Debug)]
pub struct PositionStore {
    path: PathBuf,
    offsets: Arc<RwLock<OffsetMap>>,
}

impl PositionStore {
    /// Open the store, loading any offsets persisted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let offsets = load_offsets(&path)?;

        if offsets.is_empty() && !path.exists() {
            info!(path = %path.display(), "Position file does not exist yet, starting fresh");
        } else {
            info!(path = %path.display(), files = offsets.len(), "Loaded file positions");
        }

        Ok(Self {
            path,
            offsets: Arc::new(RwLock::new(offsets)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset for `filename`, 0 when unknown
    pub fn get(&self, filename: &str) -> u64 {
        self.offsets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(filename)
            .copied()
            .unwrap_or(0)
    }

    pub fn set(&self, filename: &str, offset: u64) {
        self.offsets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(filename.to_string(), offset);
    }

    /// Drop the entry, returning the offset it held
    pub fn remove(&self, filename: &str) -> Option<u64> {
        self.offsets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(filename)
    }

    /// Copy of the whole map
    pub fn offsets(&self) -> OffsetMap {
        self.offsets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.offsets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist a consistent copy of the map. The lock is released before any
    /// serialization or disk I/O happens.
    pub fn snapshot(&self) -> Result<()> {
        let copy = self.offsets();
        atomic_write(&self.path, &copy)?;
        debug!(files = copy.len(), "Position snapshot saved");
        Ok(())
    }

    async fn snapshot_blocking(&self) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.snapshot())
            .await
            .map_err(|e| Error::Persistence(format!("snapshot task failed: {}", e)))?
    }

    /// Snapshot repeatedly, sleeping `interval` after each completed save,
    /// until `cancel` fires. A final snapshot is taken on the way out.
    ///
    /// Failures are logged and retried at the next interval; the in-memory
    /// map stays authoritative.
    pub async fn run_snapshots(self, interval: Duration, cancel: CancellationToken) {
        info!(
            path = %self.path.display(),
            interval = ?interval,
            "Position snapshot task started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            if let Err(e) = self.snapshot_blocking().await {
                error!(error = %e, "Failed to save file positions");
            }
        }

        match self.snapshot_blocking().await {
            Ok(()) => info!(files = self.len(), "Final position snapshot saved"),
            Err(e) => warn!(error = %e, "Failed to save final position snapshot"),
        }
    }
}
