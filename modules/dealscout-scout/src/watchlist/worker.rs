//! Watchlist Worker: one bounded cycle per job.
//!
//! cascade → score → macro risk → threshold filter → diff against the last
//! snapshot → persist → alert on genuine deltas.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use dealscout_common::{
    DealScoutError, DiffResult, MacroSignals, ScoredCandidate, Snapshot, SnapshotItem, Watchlist,
};

use crate::infra::util::canonical_url;
use crate::risk::{blend_with, RiskConfig};
use crate::search::{CascadeRequest, SearchCascade};
use crate::traits::MacroDataProvider;

use super::notify::{build_alert, Notifier};
use super::snapshot::{diff, SnapshotStore};
use super::store::WatchlistSource;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Candidates kept from the cascade per cycle.
    pub result_cap: usize,
    pub search_timeout: Duration,
    pub macro_timeout: Duration,
    pub risk: RiskConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            result_cap: 20,
            search_timeout: Duration::from_secs(20),
            macro_timeout: Duration::from_secs(15),
            risk: RiskConfig::default(),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub watchlist_id: String,
    pub candidates: usize,
    pub kept: usize,
    pub risk: f64,
    pub diff: DiffResult,
    pub alerted: bool,
}

pub struct WatchlistWorker {
    source: Arc<dyn WatchlistSource>,
    cascade: Arc<SearchCascade>,
    macro_data: Arc<dyn MacroDataProvider>,
    snapshots: Arc<dyn SnapshotStore>,
    notifier: Arc<Notifier>,
    config: WorkerConfig,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Snapshot entry for a candidate that passed the thresholds.
fn snapshot_item(candidate: &ScoredCandidate, risk: f64) -> SnapshotItem {
    SnapshotItem {
        url: canonical_url(&candidate.hit.url),
        score: candidate.score,
        risk,
        title: candidate.hit.title.clone(),
        price: candidate.signals.price,
        cap_rate: candidate.signals.cap_rate_pct,
    }
}

/// Candidates that clear the watchlist's score floor and risk ceiling.
pub fn filter_items(watchlist: &Watchlist, candidates: &[ScoredCandidate], risk: f64) -> Vec<SnapshotItem> {
    if risk > watchlist.risk_max {
        return Vec::new();
    }
    candidates
        .iter()
        .filter(|c| c.score >= watchlist.min_score)
        .map(|c| snapshot_item(c, risk))
        .collect()
}

impl WatchlistWorker {
    pub fn new(
        source: Arc<dyn WatchlistSource>,
        cascade: Arc<SearchCascade>,
        macro_data: Arc<dyn MacroDataProvider>,
        snapshots: Arc<dyn SnapshotStore>,
        notifier: Arc<Notifier>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            source,
            cascade,
            macro_data,
            snapshots,
            notifier,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Run one cycle. Cycles for the same id never overlap. Errors are a
    /// missing watchlist or a search that failed at every stage (nothing is
    /// diffed or saved then); every other failure degrades in place.
    pub async fn run_cycle(&self, id: &str) -> Result<CycleReport, DealScoutError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let watchlist = match self.source.get(id).await {
            Ok(Some(w)) => w,
            Ok(None) => return Err(DealScoutError::WatchlistConfigMissing(id.to_string())),
            Err(e) => {
                warn!(watchlist_id = id, error = %e, "Failed to load watchlist definitions");
                return Err(DealScoutError::WatchlistConfigMissing(id.to_string()));
            }
        };
        info!(watchlist_id = id, query = watchlist.query.as_str(), "Watchlist cycle starting");

        let request = CascadeRequest::new(watchlist.query.clone(), self.config.result_cap)
            .with_domains(watchlist.domains.clone())
            .with_timeout(self.config.search_timeout);
        let outcome = self.cascade.run(&request).await;
        if outcome.all_stages_failed {
            // Keep the prior snapshot as the baseline for the next tick.
            return Err(DealScoutError::SearchProviderError(format!(
                "all {} search stages failed for watchlist {id}",
                outcome.stages.len()
            )));
        }

        let signals = self.macro_signals(id).await;
        let assessment = blend_with(&signals, &self.config.risk);
        let items = filter_items(&watchlist, &outcome.candidates, assessment.score);

        let prior = match self.snapshots.load(id).await {
            Ok(Some(snapshot)) => snapshot.items,
            Ok(None) => Vec::new(),
            Err(e) => {
                let err = DealScoutError::SnapshotUnreadable {
                    watchlist_id: id.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Treating prior snapshot as empty");
                Vec::new()
            }
        };

        let delta = diff(&prior, &items);
        let snapshot = Snapshot {
            watchlist_id: id.to_string(),
            taken_at: Utc::now(),
            items,
        };
        if let Err(e) = self.snapshots.save(&snapshot).await {
            warn!(watchlist_id = id, error = %e, "Failed to persist snapshot");
        }

        let alerted = delta.alertable() > 0;
        if alerted {
            self.notifier.notify(&build_alert(&watchlist, &delta)).await;
        }

        info!(
            watchlist_id = id,
            candidates = outcome.candidates.len(),
            kept = snapshot.items.len(),
            risk = assessment.score,
            new = delta.new.len(),
            changed = delta.changed.len(),
            removed = delta.removed.len(),
            alerted,
            "Watchlist cycle complete"
        );

        Ok(CycleReport {
            watchlist_id: id.to_string(),
            candidates: outcome.candidates.len(),
            kept: snapshot.items.len(),
            risk: assessment.score,
            diff: delta,
            alerted,
        })
    }

    /// Macro snapshot, or no signals (neutral risk) when unavailable.
    async fn macro_signals(&self, id: &str) -> MacroSignals {
        let timeout = self.config.macro_timeout;
        let failure = match tokio::time::timeout(timeout, self.macro_data.fetch()).await {
            Ok(Ok(signals)) => return signals,
            Ok(Err(e)) => DealScoutError::MacroDataUnavailable(e.to_string()),
            Err(_) => DealScoutError::MacroDataUnavailable(format!("timed out after {timeout:?}")),
        };
        warn!(watchlist_id = id, error = %failure, "Using neutral risk");
        MacroSignals::default()
    }
}
