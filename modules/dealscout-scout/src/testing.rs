// Test mocks for the discovery and watchlist pipelines.
//
// One mock per trait boundary:
// - MockSearcher (WebSearcher): query→hits map, optional delay / failures
// - MockRenderer (PageRenderer): url→HTML map, optional redirects
// - MockMacro (MacroDataProvider): fixed signals or failure
// - RecordingSink (AlertSink): records delivered alerts
// - ManualTimer (TimerService): ticks only when the test fires them
//
// Plus builders for common fixtures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use dealscout_common::{AlertNotification, MacroSignals, SearchHit, Watchlist};

use crate::traits::{LoadCondition, MacroDataProvider, PageRenderer, RenderedPage, WebSearcher};
use crate::watchlist::notify::AlertSink;
use crate::watchlist::timer::{TickFn, TimerHandle, TimerService};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// Exact-query search mock. Unregistered queries return the fallback hits
/// (empty unless `.otherwise()` was set). Every issued query is recorded.
pub struct MockSearcher {
    results: HashMap<String, Vec<SearchHit>>,
    fallback: Vec<SearchHit>,
    failing: Vec<String>,
    fail_all: AtomicBool,
    delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
}

impl Default for MockSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSearcher {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            fallback: Vec::new(),
            failing: Vec::new(),
            fail_all: AtomicBool::new(false),
            delay: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn on_search(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.results.insert(query.to_string(), hits);
        self
    }

    /// Hits for any query without its own registration.
    pub fn otherwise(mut self, hits: Vec<SearchHit>) -> Self {
        self.fallback = hits;
        self
    }

    pub fn fail_on(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_all: AtomicBool::new(true),
            ..Self::new()
        }
    }

    /// Switch a provider outage on or off for every query.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Sleep before answering, to exercise caller deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.queries).len()
    }
}

#[async_trait]
impl WebSearcher for MockSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        lock(&self.queries).push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all.load(Ordering::SeqCst) || self.failing.iter().any(|q| q == query) {
            bail!("MockSearcher: provider failure for {query}");
        }
        let hits = self.results.get(query).unwrap_or(&self.fallback);
        Ok(hits.iter().take(max_results).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// url→HTML renderer. Returns `Err` for unregistered URLs. Redirects map a
/// requested URL to a different final URL and page.
pub struct MockRenderer {
    pages: HashMap<String, (String, String)>,
    fail_first: AtomicUsize,
    loads: Mutex<Vec<(String, LoadCondition)>>,
    screenshots: AtomicUsize,
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            fail_first: AtomicUsize::new(0),
            loads: Mutex::new(Vec::new()),
            screenshots: AtomicUsize::new(0),
        }
    }

    pub fn on_page(mut self, url: &str, html: &str) -> Self {
        self.pages
            .insert(url.to_string(), (url.to_string(), html.to_string()));
        self
    }

    pub fn on_redirect(mut self, requested: &str, final_url: &str, html: &str) -> Self {
        self.pages.insert(
            requested.to_string(),
            (final_url.to_string(), html.to_string()),
        );
        self
    }

    /// Fail the first `n` load calls regardless of URL.
    pub fn fail_first_loads(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn load_calls(&self) -> usize {
        lock(&self.loads).len()
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        lock(&self.loads).iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn conditions(&self) -> Vec<LoadCondition> {
        lock(&self.loads).iter().map(|(_, c)| *c).collect()
    }

    pub fn screenshot_calls(&self) -> usize {
        self.screenshots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for MockRenderer {
    async fn load(
        &self,
        url: &str,
        condition: LoadCondition,
        _timeout: Duration,
    ) -> Result<RenderedPage> {
        lock(&self.loads).push((url.to_string(), condition));
        let failed = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            bail!("MockRenderer: injected failure for {url}");
        }
        let (final_url, html) = self
            .pages
            .get(url)
            .ok_or_else(|| anyhow!("MockRenderer: no page registered for {url}"))?;
        Ok(RenderedPage {
            requested_url: url.to_string(),
            final_url: final_url.clone(),
            html: html.clone(),
        })
    }

    async fn screenshot(&self, _url: &str, _timeout: Duration) -> Result<Vec<u8>> {
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(b"\x89PNG\r\n\x1a\nmock".to_vec())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// MockMacro
// ---------------------------------------------------------------------------

pub struct MockMacro {
    signals: Option<MacroSignals>,
    calls: AtomicUsize,
}

impl MockMacro {
    pub fn new(signals: MacroSignals) -> Self {
        Self {
            signals: Some(signals),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            signals: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MacroDataProvider for MockMacro {
    async fn fetch(&self) -> Result<MacroSignals> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.signals
            .clone()
            .ok_or_else(|| anyhow!("MockMacro: macro data unavailable"))
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<AlertNotification>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records nothing and rejects every delivery.
    pub fn failing() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn alerts(&self) -> Vec<AlertNotification> {
        lock(&self.alerts).clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn deliver(&self, alert: &AlertNotification) -> Result<()> {
        if self.fail {
            bail!("RecordingSink: delivery rejected");
        }
        lock(&self.alerts).push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// ManualTimer
// ---------------------------------------------------------------------------

struct ManualEntry {
    id: String,
    interval: Duration,
    on_tick: TickFn,
    cancelled: Arc<AtomicBool>,
}

/// Timer service that never ticks on its own; tests call `fire(id)`.
#[derive(Default)]
pub struct ManualTimer {
    entries: Mutex<Vec<ManualEntry>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick every live timer registered for `id`.
    pub fn fire(&self, id: &str) {
        let callbacks: Vec<TickFn> = lock(&self.entries)
            .iter()
            .filter(|e| e.id == id && !e.cancelled.load(Ordering::SeqCst))
            .map(|e| e.on_tick.clone())
            .collect();
        for on_tick in callbacks {
            on_tick(id);
        }
    }

    /// Live (uncancelled) timers for `id`.
    pub fn active(&self, id: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|e| e.id == id && !e.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Timers ever scheduled for `id`, cancelled or not.
    pub fn scheduled(&self, id: &str) -> usize {
        lock(&self.entries).iter().filter(|e| e.id == id).count()
    }

    pub fn interval(&self, id: &str) -> Option<Duration> {
        lock(&self.entries)
            .iter()
            .rev()
            .find(|e| e.id == id && !e.cancelled.load(Ordering::SeqCst))
            .map(|e| e.interval)
    }
}

impl TimerService for ManualTimer {
    fn schedule_recurring(&self, id: &str, interval: Duration, on_tick: TickFn) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        lock(&self.entries).push(ManualEntry {
            id: id.to_string(),
            interval,
            on_tick,
            cancelled: cancelled.clone(),
        });
        TimerHandle::new(id, cancelled, None)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn hit(title: &str, url: &str, snippet: &str) -> SearchHit {
    SearchHit::new(title, url, snippet)
}

/// Enabled watchlist with no thresholds and the default schedule.
pub fn watchlist(id: &str, query: &str) -> Watchlist {
    Watchlist {
        id: id.to_string(),
        label: id.to_string(),
        query: query.to_string(),
        domains: Vec::new(),
        min_score: 0,
        risk_max: 100.0,
        schedule: String::new(),
        enabled: true,
    }
}

/// Minimal marketplace detail page with the usual fields filled.
pub fn listing_page(title: &str, price: &str, address: &str, cap_rate: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title></head><body>
        <h1 class="property-name">{title}</h1>
        <span data-cy="asking-price">{price}</span>
        <span data-cy="property-address">{address}</span>
        <p>Cap Rate: {cap_rate}</p>
        </body></html>"#
    )
}
