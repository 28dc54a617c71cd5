//! Notifier: fan alert payloads out to live subscribers and outbound sinks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use dealscout_common::{AlertItem, AlertNotification, DiffResult, Watchlist};

/// Alerts carry at most this many sample items.
pub const MAX_SAMPLE: usize = 5;

const LIVE_CAPACITY: usize = 64;
const SINK_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &AlertNotification) -> Result<()>;

    fn name(&self) -> &str;
}

/// Build the alert for a diff. New items are sampled before changed ones.
pub fn build_alert(watchlist: &Watchlist, diff: &DiffResult) -> AlertNotification {
    let sample = diff
        .new
        .iter()
        .chain(diff.changed.iter())
        .take(MAX_SAMPLE)
        .map(|item| AlertItem {
            title: item.title.clone(),
            url: item.url.clone(),
            score: item.score,
            risk: item.risk,
        })
        .collect();

    AlertNotification {
        watchlist_id: watchlist.id.clone(),
        watchlist_label: watchlist.label.clone(),
        new_count: diff.new.len(),
        changed_count: diff.changed.len(),
        removed_count: diff.removed.len(),
        sample,
        at: Utc::now(),
    }
}

/// One-line human summary used as the webhook `text` field.
pub fn summary_line(alert: &AlertNotification) -> String {
    let mut line = format!(
        "{}: {} new, {} changed, {} removed",
        alert.watchlist_label, alert.new_count, alert.changed_count, alert.removed_count
    );
    if let Some(top) = alert.sample.first() {
        line.push_str(&format!(
            ". Top: {} (score {}, risk {:.0}) {}",
            top.title, top.score, top.risk, top.url
        ));
    }
    line
}

// --- Webhook ---

/// POSTs the alert as JSON with an extra `text` summary line.
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(SINK_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

pub fn webhook_body(alert: &AlertNotification) -> Result<serde_json::Value> {
    let mut body = serde_json::to_value(alert).context("Failed to serialize alert")?;
    if let Some(obj) = body.as_object_mut() {
        obj.insert("text".to_string(), serde_json::Value::String(summary_line(alert)));
    }
    Ok(body)
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, alert: &AlertNotification) -> Result<()> {
        let body = webhook_body(alert)?;
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("Webhook request failed")?;
        if !resp.status().is_success() {
            bail!("Webhook returned status {}", resp.status());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

// --- Notifier ---

pub struct Notifier {
    live: broadcast::Sender<AlertNotification>,
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// A notifier with no outbound sinks; alerts only reach live subscribers.
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            live,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Webhook sink when a url is configured, live-only otherwise.
    pub fn from_webhook(url: Option<&str>) -> Self {
        match url {
            Some(url) => Self::new().with_sink(Arc::new(WebhookSink::new(url))),
            None => Self::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertNotification> {
        self.live.subscribe()
    }

    /// Deliver to live subscribers and every sink. Sink failures are logged
    /// and never propagate. Returns the number of sinks that accepted it.
    pub async fn notify(&self, alert: &AlertNotification) -> usize {
        let live = self.live.send(alert.clone()).unwrap_or(0);
        let mut delivered = 0;
        for sink in &self.sinks {
            match tokio::time::timeout(SINK_TIMEOUT, sink.deliver(alert)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(sink = sink.name(), watchlist_id = alert.watchlist_id.as_str(), error = %e, "Alert delivery failed");
                }
                Err(_) => {
                    warn!(sink = sink.name(), watchlist_id = alert.watchlist_id.as_str(), "Alert delivery timed out");
                }
            }
        }
        info!(
            watchlist_id = alert.watchlist_id.as_str(),
            new = alert.new_count,
            changed = alert.changed_count,
            removed = alert.removed_count,
            live,
            sinks = delivered,
            "Alert sent"
        );
        delivered
    }
}
