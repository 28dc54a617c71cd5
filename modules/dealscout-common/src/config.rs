use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Providers
    pub serper_api_key: String,
    pub browserless_url: String,
    pub browserless_token: Option<String>,
    pub fred_api_key: Option<String>,

    // Storage
    pub watchlist_file: PathBuf,
    pub snapshot_dir: PathBuf,
    pub screenshot_dir: Option<PathBuf>,

    // Alerts
    pub alert_webhook_url: Option<String>,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Pipeline tuning
    pub search_timeout: Duration,
    pub page_timeout: Duration,
    pub macro_timeout: Duration,
    pub max_candidates: usize,
    pub heartbeat_interval: Duration,
    pub score_only: bool,
    pub default_watch_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing or malformed.
    pub fn from_env() -> Self {
        Self {
            serper_api_key: required_env("SERPER_API_KEY"),
            browserless_url: env::var("BROWSERLESS_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            browserless_token: optional_env("BROWSERLESS_TOKEN"),
            fred_api_key: optional_env("FRED_API_KEY"),
            watchlist_file: env::var("WATCHLIST_FILE")
                .unwrap_or_else(|_| "data/watchlists.json".to_string())
                .into(),
            snapshot_dir: env::var("SNAPSHOT_DIR")
                .unwrap_or_else(|_| "data/snapshots".to_string())
                .into(),
            screenshot_dir: optional_env("SCREENSHOT_DIR").map(PathBuf::from),
            alert_webhook_url: optional_env("ALERT_WEBHOOK_URL"),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parsed_env("API_PORT", 8080),
            search_timeout: Duration::from_secs(parsed_env("SEARCH_TIMEOUT_SECS", 20)),
            page_timeout: Duration::from_secs(parsed_env("PAGE_TIMEOUT_SECS", 45)),
            macro_timeout: Duration::from_secs(parsed_env("MACRO_TIMEOUT_SECS", 15)),
            max_candidates: parsed_env("MAX_CANDIDATES", 8),
            heartbeat_interval: Duration::from_secs(parsed_env("HEARTBEAT_SECS", 15)),
            score_only: parsed_env("SCORE_ONLY", false),
            default_watch_interval: Duration::from_secs(
                60 * parsed_env::<u64>("DEFAULT_WATCH_INTERVAL_MINS", 360),
            ),
        }
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            serper_api_key = redact(&self.serper_api_key),
            browserless_url = self.browserless_url.as_str(),
            browserless_token = self.browserless_token.as_deref().map(redact).unwrap_or("-"),
            fred_api_key = self.fred_api_key.as_deref().map(redact).unwrap_or("-"),
            watchlist_file = %self.watchlist_file.display(),
            snapshot_dir = %self.snapshot_dir.display(),
            screenshot_dir = ?self.screenshot_dir,
            alert_webhook = self.alert_webhook_url.is_some(),
            search_timeout_secs = self.search_timeout.as_secs(),
            page_timeout_secs = self.page_timeout.as_secs(),
            max_candidates = self.max_candidates,
            score_only = self.score_only,
            "Loaded config"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid value, got {raw:?}")),
        Err(_) => default,
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "-"
    } else {
        "****"
    }
}
