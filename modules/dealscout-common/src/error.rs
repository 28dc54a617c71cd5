use std::time::Duration;

use thiserror::Error;

/// Stage-local failures. Every variant is recoverable at the stage boundary:
/// callers degrade to an empty hit list, a null-filled extraction, a neutral
/// risk score, or an empty baseline instead of aborting the run or cycle.
#[derive(Error, Debug)]
pub enum DealScoutError {
    #[error("Search timed out after {timeout:?}: {query}")]
    SearchTimeout { query: String, timeout: Duration },

    #[error("Search provider error: {0}")]
    SearchProviderError(String),

    #[error("Page load timed out after {timeout:?}: {url}")]
    ExtractionTimeout { url: String, timeout: Duration },

    #[error("Page blocked: {url}")]
    ExtractionBlocked { url: String },

    #[error("No listing fields found: {url}")]
    ExtractionEmpty { url: String },

    #[error("Macro data unavailable: {0}")]
    MacroDataUnavailable(String),

    #[error("Snapshot unreadable for watchlist {watchlist_id}: {reason}")]
    SnapshotUnreadable { watchlist_id: String, reason: String },

    #[error("Watchlist not configured: {0}")]
    WatchlistConfigMissing(String),
}

impl DealScoutError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DealScoutError::SearchTimeout { .. } | DealScoutError::ExtractionTimeout { .. }
        )
    }
}
