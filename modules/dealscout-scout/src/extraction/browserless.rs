use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use browserless_client::{BrowserlessClient, WaitUntil};
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::traits::{LoadCondition, PageRenderer, RenderedPage};

pub struct BrowserlessRenderer {
    client: BrowserlessClient,
}

impl BrowserlessRenderer {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        info!(base_url, "Using BrowserlessRenderer");
        Self {
            client: BrowserlessClient::new(base_url, token),
        }
    }
}

fn wait_until(condition: LoadCondition) -> WaitUntil {
    match condition {
        LoadCondition::NetworkIdle2 => WaitUntil::NetworkIdle2,
        LoadCondition::DomContentLoaded => WaitUntil::DomContentLoaded,
    }
}

/// `/content` does not report redirects, so the landing URL is recovered from
/// the page's own canonical / og:url declaration.
pub fn declared_url(html: &str, requested_url: &str) -> String {
    let doc = Html::parse_document(html);
    let declared = ["link[rel='canonical']", "meta[property='og:url']"]
        .iter()
        .find_map(|raw| {
            let selector = Selector::parse(raw).ok()?;
            let el = doc.select(&selector).next()?;
            el.value()
                .attr("href")
                .or_else(|| el.value().attr("content"))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        });

    let Some(declared) = declared else {
        return requested_url.to_string();
    };
    match url::Url::parse(requested_url).and_then(|base| base.join(&declared)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => declared,
    }
}

#[async_trait]
impl PageRenderer for BrowserlessRenderer {
    async fn load(
        &self,
        url: &str,
        condition: LoadCondition,
        timeout: Duration,
    ) -> Result<RenderedPage> {
        info!(url, ?condition, renderer = "browserless", "Rendering page");

        let html = self
            .client
            .content(url, wait_until(condition), timeout)
            .await
            .context("Browserless content request failed")?;

        if html.trim().is_empty() {
            warn!(url, renderer = "browserless", "Empty HTML response");
        }

        let final_url = declared_url(&html, url);
        info!(
            url,
            final_url = final_url.as_str(),
            bytes = html.len(),
            renderer = "browserless",
            "Rendered page"
        );

        Ok(RenderedPage {
            requested_url: url.to_string(),
            final_url,
            html,
        })
    }

    async fn screenshot(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let png = self
            .client
            .screenshot(url, timeout)
            .await
            .context("Browserless screenshot request failed")?;
        Ok(png)
    }

    fn name(&self) -> &str {
        "browserless"
    }
}
