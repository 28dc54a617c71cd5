//! Watchlist definitions: a JSON array on disk, re-read on every call so
//! edits are picked up by the next reload or cycle.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use dealscout_common::Watchlist;

#[async_trait]
pub trait WatchlistSource: Send + Sync {
    async fn list(&self) -> Result<Vec<Watchlist>>;

    async fn get(&self, id: &str) -> Result<Option<Watchlist>> {
        Ok(self.list().await?.into_iter().find(|w| w.id == id))
    }
}

pub struct FileWatchlistStore {
    path: PathBuf,
}

impl FileWatchlistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WatchlistSource for FileWatchlistStore {
    async fn list(&self) -> Result<Vec<Watchlist>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Watchlist file not found, no watchlists loaded");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid watchlist JSON in {}", self.path.display()))
    }
}

#[derive(Default)]
pub struct MemoryWatchlistStore {
    watchlists: RwLock<Vec<Watchlist>>,
}

impl MemoryWatchlistStore {
    pub fn new(watchlists: Vec<Watchlist>) -> Self {
        Self {
            watchlists: RwLock::new(watchlists),
        }
    }

    pub async fn upsert(&self, watchlist: Watchlist) {
        let mut all = self.watchlists.write().await;
        match all.iter_mut().find(|w| w.id == watchlist.id) {
            Some(existing) => *existing = watchlist,
            None => all.push(watchlist),
        }
    }

    pub async fn remove(&self, id: &str) {
        self.watchlists.write().await.retain(|w| w.id != id);
    }
}

#[async_trait]
impl WatchlistSource for MemoryWatchlistStore {
    async fn list(&self) -> Result<Vec<Watchlist>> {
        Ok(self.watchlists.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_reads_definitions_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchlists.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "w1", "label": "TX DG", "query": "dollar general texas",
                 "domains": ["crexi.com"], "min_score": 50, "risk_max": 60, "schedule": "@daily"},
                {"id": "w2", "label": "Off", "query": "walgreens", "enabled": false}
            ]"#,
        )
        .unwrap();

        let store = FileWatchlistStore::new(&path);
        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].min_score, 50);
        assert!(!all[1].enabled);
        assert_eq!(store.get("w2").await.unwrap().unwrap().query, "walgreens");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatchlistStore::new(dir.path().join("nope.json"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchlists.json");
        std::fs::write(&path, "[{").unwrap();
        assert!(FileWatchlistStore::new(&path).list().await.is_err());
    }
}
