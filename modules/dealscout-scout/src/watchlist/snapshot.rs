//! Snapshot Store & Diff.
//!
//! One snapshot per watchlist; each cycle's snapshot fully replaces the last.
//! `diff` partitions the next item set against the prior one by url.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use dealscout_common::{DiffResult, Snapshot, SnapshotItem};

use crate::infra::util::content_hash;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot at {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Last persisted snapshot, `None` when the watchlist has never run.
    async fn load(&self, watchlist_id: &str) -> Result<Option<Snapshot>, SnapshotError>;

    /// Replace the stored snapshot for `snapshot.watchlist_id`.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;

    /// Remove the snapshot. Deleting a missing snapshot is not an error.
    async fn delete(&self, watchlist_id: &str) -> Result<(), SnapshotError>;
}

/// Partition `next` against `prior`:
/// - url not in prior → `new`
/// - url in prior with any tracked field different → `changed`
/// - prior urls absent from next → `removed` (prior order)
///
/// Duplicate urls in `next` collapse to their first occurrence.
pub fn diff(prior: &[SnapshotItem], next: &[SnapshotItem]) -> DiffResult {
    let mut lookup: HashMap<&str, &SnapshotItem> = HashMap::with_capacity(prior.len());
    for item in prior {
        lookup.entry(item.url.as_str()).or_insert(item);
    }

    let mut result = DiffResult::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(next.len());
    for item in next {
        if !seen.insert(item.url.as_str()) {
            continue;
        }
        match lookup.remove(item.url.as_str()) {
            None => result.new.push(item.clone()),
            Some(before) if before.tracked_fields_differ(item) => result.changed.push(item.clone()),
            Some(_) => {}
        }
    }

    let mut removed_seen = HashSet::new();
    for item in prior {
        if lookup.contains_key(item.url.as_str()) && removed_seen.insert(item.url.as_str()) {
            result.removed.push(item.url.clone());
        }
    }
    result
}

// --- File-backed ---

/// One JSON file per watchlist under `dir`. Writes go to a temp file that is
/// renamed over the target so a reader never sees a partial snapshot.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Readable sanitized id plus a digest of the raw id, so ids that
    /// sanitize alike still get their own file.
    pub fn path_for(&self, watchlist_id: &str) -> PathBuf {
        let safe: String = watchlist_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let digest = content_hash(watchlist_id);
        self.dir.join(format!("{safe}-{}.json", &digest[..16]))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self, watchlist_id: &str) -> Result<Option<Snapshot>, SnapshotError> {
        let path = self.path_for(watchlist_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let snapshot: Snapshot =
            serde_json::from_str(&raw).map_err(|e| SnapshotError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let path = self.path_for(&snapshot.watchlist_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(
            watchlist_id = snapshot.watchlist_id.as_str(),
            items = snapshot.items.len(),
            path = %path.display(),
            "Snapshot saved"
        );
        Ok(())
    }

    async fn delete(&self, watchlist_id: &str) -> Result<(), SnapshotError> {
        let path = self.path_for(watchlist_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

// --- In-memory ---

#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, watchlist_id: &str) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.snapshots.read().await.get(watchlist_id).cloned())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.watchlist_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, watchlist_id: &str) -> Result<(), SnapshotError> {
        self.snapshots.write().await.remove(watchlist_id);
        Ok(())
    }
}
