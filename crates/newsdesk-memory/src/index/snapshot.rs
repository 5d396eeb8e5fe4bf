//! JSON snapshot of the index contents
//!
//! Snapshots are written to a temporary file next to the target and renamed
//! into place, so a crash mid-write never leaves a truncated snapshot.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MemoryError, Result};
use crate::fingerprint::Fingerprint;
use crate::memory::types::ContentItem;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    /// Embedding dimension the items were indexed with
    pub dimension: usize,
    pub items: BTreeMap<Fingerprint, ContentItem>,
}

impl IndexSnapshot {
    pub fn new(dimension: usize, items: impl IntoIterator<Item = ContentItem>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dimension,
            items: items
                .into_iter()
                .map(|item| (item.fingerprint.clone(), item))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Read a snapshot; a missing file yields `None`
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: IndexSnapshot = serde_json::from_str(&content).map_err(|e| {
            MemoryError::Storage(format!("unreadable snapshot {}: {e}", path.display()))
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MemoryError::Storage(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                path.display()
            )));
        }

        info!(
            "Loaded {} items from snapshot {}",
            snapshot.len(),
            path.display()
        );
        Ok(Some(snapshot))
    }

    /// Write the snapshot atomically, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;

        info!("Saved {} items to snapshot {}", self.len(), path.display());
        Ok(())
    }
}
