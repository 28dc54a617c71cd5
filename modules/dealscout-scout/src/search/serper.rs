use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::info;

use dealscout_common::SearchHit;

use crate::traits::WebSearcher;

const SERPER_URL: &str = "https://google.serper.dev/search";

// --- Serper (Google Search) ---

pub struct SerperSearcher {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, serde::Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl SerperSearcher {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: SERPER_URL.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Point at a different endpoint (local stub servers).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[async_trait]
impl WebSearcher for SerperSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        info!(query, max_results, "Serper search");

        let body = serde_json::json!({
            "q": query,
            "num": max_results,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Serper API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            bail!("Serper returned {status}: {message}");
        }

        let data: SerperResponse = resp
            .json()
            .await
            .context("Failed to parse Serper response")?;

        let hits: Vec<SearchHit> = data
            .organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .map(|r| SearchHit::new(r.title, r.link, r.snippet))
            .collect();

        info!(query, count = hits.len(), "Serper search complete");
        Ok(hits)
    }
}
