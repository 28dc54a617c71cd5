pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// Puppeteer navigation completion criterion passed through `gotoOptions.waitUntil`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle0,
    NetworkIdle2,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: WaitUntil,
    timeout: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    goto_options: GotoOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScreenshotOptions {
    full_page: bool,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScreenshotRequest<'a> {
    url: &'a str,
    options: ScreenshotOptions,
    goto_options: GotoOptions,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        // Per-call deadlines are enforced by the caller; this is only a backstop.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}/{}", self.base_url, path);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Fetch fully-rendered HTML content for a URL via the /content endpoint.
    pub async fn content(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> Result<String> {
        let body = ContentRequest {
            url,
            goto_options: GotoOptions {
                wait_until,
                timeout: timeout.as_millis() as u64,
            },
        };

        debug!(url, ?wait_until, "browserless: content");

        let resp = self
            .client
            .post(self.endpoint("content"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// Capture a PNG screenshot of the viewport via the /screenshot endpoint.
    pub async fn screenshot(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let body = ScreenshotRequest {
            url,
            options: ScreenshotOptions {
                full_page: false,
                kind: "png",
            },
            goto_options: GotoOptions {
                wait_until: WaitUntil::DomContentLoaded,
                timeout: timeout.as_millis() as u64,
            },
        };

        let resp = self
            .client
            .post(self.endpoint("screenshot"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }
}
