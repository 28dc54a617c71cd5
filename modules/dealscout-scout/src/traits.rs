// Trait abstractions for the pipeline's external collaborators.
//
// WebSearcher: keyword search provider (Serper in production).
// PageRenderer: headless page rendering (Browserless in production).
// MacroDataProvider: macro series for the Risk Blender (FRED in production).
//
// Mocks for all three live in `testing` so the run controller and watchlist
// worker are exercised with no network.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use dealscout_common::{MacroSignals, SearchHit};

#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// When the renderer considers a navigation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCondition {
    /// No more than two in-flight requests for a short quiet window.
    NetworkIdle2,
    /// DOM parsed; subresources may still be loading.
    DomContentLoaded,
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub requested_url: String,
    /// Where the navigation actually ended up after redirects.
    pub final_url: String,
    pub html: String,
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `url` and return its final HTML. `timeout` is passed through to
    /// the renderer; callers still bound the whole call with their own deadline.
    async fn load(&self, url: &str, condition: LoadCondition, timeout: Duration)
        -> Result<RenderedPage>;

    /// PNG screenshot of the page at `url`.
    async fn screenshot(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait MacroDataProvider: Send + Sync {
    /// Current macro snapshot. Individual series may be missing; an `Err`
    /// means nothing usable could be fetched.
    async fn fetch(&self) -> Result<MacroSignals>;
}
