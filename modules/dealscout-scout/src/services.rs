//! Production wiring: builds the run controller and watchlist subsystem
//! from `Config`, shared by the `scout` CLI and the API server.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use dealscout_common::{Config, MacroSignals, RunMode};

use crate::events::EventBus;
use crate::extraction::{BrowserlessRenderer, ExtractionConfig, ExtractionEngine};
use crate::macro_data::FredMacroProvider;
use crate::run::{MemoryRunStore, RunConfig, RunController};
use crate::search::{CascadeConfig, SearchCascade, SerperSearcher};
use crate::traits::MacroDataProvider;
use crate::watchlist::{
    FileSnapshotStore, FileWatchlistStore, Notifier, TokioTimerService, WatchlistScheduler,
    WatchlistSource, WatchlistWorker, WorkerConfig,
};

/// Stands in when no FRED key is configured; every cycle gets neutral risk.
struct NoMacroData;

#[async_trait::async_trait]
impl MacroDataProvider for NoMacroData {
    async fn fetch(&self) -> Result<MacroSignals> {
        anyhow::bail!("FRED_API_KEY not configured")
    }
}

pub struct Services {
    pub controller: RunController,
    pub scheduler: Arc<WatchlistScheduler>,
    pub worker: Arc<WatchlistWorker>,
    pub notifier: Arc<Notifier>,
    pub watchlists: Arc<dyn WatchlistSource>,
}

impl Services {
    pub fn from_config(config: &Config) -> Self {
        let searcher = Arc::new(SerperSearcher::new(&config.serper_api_key));
        let cascade = Arc::new(SearchCascade::new(
            searcher,
            CascadeConfig {
                timeout: config.search_timeout,
                ..Default::default()
            },
        ));

        let renderer = Arc::new(BrowserlessRenderer::new(
            &config.browserless_url,
            config.browserless_token.as_deref(),
        ));
        let extractor = Arc::new(ExtractionEngine::new(
            renderer,
            ExtractionConfig {
                page_timeout: config.page_timeout,
                screenshot_dir: config.screenshot_dir.clone(),
                ..Default::default()
            },
        ));

        let controller = RunController::new(
            cascade.clone(),
            extractor,
            Arc::new(MemoryRunStore::new()),
            EventBus::new(config.heartbeat_interval),
            RunConfig {
                max_candidates: config.max_candidates,
                mode: if config.score_only {
                    RunMode::ScoreOnly
                } else {
                    RunMode::Extract
                },
                search_timeout: Some(config.search_timeout),
                ..Default::default()
            },
        );

        let macro_data: Arc<dyn MacroDataProvider> = match &config.fred_api_key {
            Some(key) => Arc::new(FredMacroProvider::new(key)),
            None => {
                warn!("FRED_API_KEY not set, watchlist risk will be neutral");
                Arc::new(NoMacroData)
            }
        };
        let snapshots = Arc::new(FileSnapshotStore::new(&config.snapshot_dir));
        let watchlists: Arc<dyn WatchlistSource> =
            Arc::new(FileWatchlistStore::new(&config.watchlist_file));
        let notifier = Arc::new(Notifier::from_webhook(config.alert_webhook_url.as_deref()));

        let worker = Arc::new(WatchlistWorker::new(
            watchlists.clone(),
            cascade,
            macro_data,
            snapshots.clone(),
            notifier.clone(),
            WorkerConfig {
                search_timeout: config.search_timeout,
                macro_timeout: config.macro_timeout,
                ..Default::default()
            },
        ));
        let scheduler = Arc::new(WatchlistScheduler::new(
            Arc::new(TokioTimerService),
            snapshots,
            config.default_watch_interval,
        ));

        Self {
            controller,
            scheduler,
            worker,
            notifier,
            watchlists,
        }
    }

    /// Re-read the watchlist file and reconcile timers. Returns how many
    /// watchlists are enabled.
    pub async fn reload_watchlists(&self) -> Result<usize> {
        let all = self.watchlists.list().await?;
        self.scheduler.sync(&all).await;
        let enabled = all.iter().filter(|w| w.enabled).count();
        info!(total = all.len(), enabled, "Watchlists reloaded");
        Ok(enabled)
    }

    /// Load watchlists, start their timers, and spawn the queue consumer.
    pub async fn start_watching(&self) -> Result<Option<JoinHandle<()>>> {
        self.reload_watchlists().await?;
        Ok(self.scheduler.spawn_consumer(self.worker.clone()))
    }
}
