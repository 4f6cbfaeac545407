//! JSON snapshot of a catalog, used to seed the in-memory stores.

use crate::domain::{Episode, Series};
use crate::error::StoreError;
use crate::store::{InMemoryEpisodeStore, InMemorySeriesStore};
use demandflow::{FlowError, Source};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Every series and episode, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl CatalogSnapshot {
    /// Reads and parses `path` on the calling thread.
    pub fn load_blocking(path: &Path) -> Result<Self, StoreError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
        let snapshot: Self = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
        tracing::debug!(
            path = %path.display(),
            series = snapshot.series.len(),
            episodes = snapshot.episodes.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    /// A single-item source that reads `path` off the async workers.
    ///
    /// File access runs on the blocking threads of the subscription's begin
    /// scheduler; combine with `subscribe_on(Scheduler::bounded_elastic(..))`
    /// to give it its own pool.
    pub fn load(path: impl Into<PathBuf>) -> Source<Self> {
        let path = path.into();
        Source::from_blocking(move || Self::load_blocking(&path).map_err(FlowError::upstream))
    }

    /// Writes the snapshot as pretty-printed JSON.
    pub fn save_blocking(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        fs::write(path, json)
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))
    }

    /// Builds stores holding the snapshot's rows.
    pub fn into_stores(self) -> (InMemorySeriesStore, InMemoryEpisodeStore) {
        (
            InMemorySeriesStore::with_rows(self.series),
            InMemoryEpisodeStore::with_rows(self.episodes),
        )
    }
}
