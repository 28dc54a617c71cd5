//! Extraction Engine: render one candidate page and pull listing fields out
//! of it, tolerating bounces, blocks, and layout drift.

pub mod browserless;
pub mod detect;
pub mod fields;
pub mod links;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{info, warn};

use dealscout_common::{DealScoutError, ExtractedListing};

use crate::infra::util::content_hash;
use crate::marketplace;
use crate::traits::{LoadCondition, PageRenderer, RenderedPage};

use detect::{detect_block, is_bounced, BlockReason, ShellSignals};
use fields::{extract_fields, first_selector_text, has_price_text, visible_text, ListingFields};

pub use browserless::BrowserlessRenderer;

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub page_timeout: Duration,
    pub screenshot_timeout: Duration,
    /// Screenshots are written here when set.
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(45),
            screenshot_timeout: Duration::from_secs(20),
            screenshot_dir: None,
        }
    }
}

/// Everything the engine needs from one rendered page, computed synchronously
/// so no parsed document is held across an await.
#[derive(Debug, Clone)]
struct PageAnalysis {
    final_url: String,
    fields: ListingFields,
    block: Option<BlockReason>,
    bounced: bool,
    drill_target: Option<String>,
}

const HEADING_SELECTORS: &[&str] = &["h1", "h2"];

fn analyze(page: &RenderedPage, requested_url: &str) -> PageAnalysis {
    let doc = Html::parse_document(&page.html);
    let market = marketplace::lookup(&page.final_url).or_else(|| marketplace::lookup(requested_url));
    let text = visible_text(&doc);
    let title = fields::document_title(&doc);
    let listing_fields = extract_fields(&doc, market, &text);

    let has_address_element = listing_fields.address.is_some()
        || ["address", "[itemprop='address']", "[itemprop='streetAddress']"]
            .iter()
            .chain(market.map(|m| m.address_selectors).unwrap_or(&[]).iter())
            .any(|raw| {
                Selector::parse(raw)
                    .map(|s| doc.select(&s).next().is_some())
                    .unwrap_or(false)
            });
    let shell = ShellSignals {
        has_price_text: has_price_text(&text),
        has_address_element,
        has_heading: first_selector_text(&doc, HEADING_SELECTORS).is_some(),
    };

    PageAnalysis {
        final_url: page.final_url.clone(),
        block: detect_block(title.as_deref(), &text, shell),
        bounced: is_bounced(&page.final_url, title.as_deref()),
        drill_target: links::pick_drill_target(&page.html, &page.final_url, requested_url),
        fields: listing_fields,
    }
}

pub struct ExtractionEngine {
    renderer: Arc<dyn PageRenderer>,
    config: ExtractionConfig,
}

impl ExtractionEngine {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: ExtractionConfig) -> Self {
        Self { renderer, config }
    }

    /// Load with a hard deadline, retrying once under the relaxed criterion.
    async fn load_with_retry(&self, url: &str) -> Result<RenderedPage, DealScoutError> {
        let timeout = self.config.page_timeout;
        for condition in [LoadCondition::NetworkIdle2, LoadCondition::DomContentLoaded] {
            match tokio::time::timeout(timeout, self.renderer.load(url, condition, timeout)).await {
                Ok(Ok(page)) => return Ok(page),
                Ok(Err(e)) => {
                    warn!(url, ?condition, error = %e, "Page load failed");
                }
                Err(_) => {
                    warn!(url, ?condition, timeout_secs = timeout.as_secs(), "Page load timed out");
                }
            }
        }
        Err(DealScoutError::ExtractionTimeout {
            url: url.to_string(),
            timeout,
        })
    }

    /// Follow one drill link. A failed drill keeps the current page.
    async fn drill(&self, target: &str, requested_url: &str) -> Option<PageAnalysis> {
        info!(from = requested_url, to = target, "Drilling to detail page");
        match self.load_with_retry(target).await {
            Ok(page) => Some(analyze(&page, requested_url)),
            Err(e) => {
                warn!(target, error = %e, "Drill navigation failed");
                None
            }
        }
    }

    /// Extract one listing. Only an unrecoverable page load is an error;
    /// blocked or empty pages come back as flagged results.
    pub async fn extract(&self, url: &str) -> Result<ExtractedListing, DealScoutError> {
        let page = self.load_with_retry(url).await?;
        let mut analysis = analyze(&page, url);
        let mut auto_drilled = false;

        if analysis.bounced && analysis.block.is_none() {
            if let Some(target) = analysis.drill_target.clone() {
                if let Some(next) = self.drill(&target, url).await {
                    analysis = next;
                    auto_drilled = true;
                }
            } else {
                info!(url, final_url = analysis.final_url.as_str(), "Bounced with no detail link to follow");
            }
        }

        if analysis.block.is_none() && analysis.fields.all_empty() && !auto_drilled {
            if let Some(target) = analysis.drill_target.clone() {
                if let Some(next) = self.drill(&target, url).await {
                    analysis = next;
                    auto_drilled = true;
                }
            }
        }

        let screenshot = self.capture(&analysis.final_url).await;

        let blocked = analysis.block.is_some();
        if let Some(reason) = analysis.block {
            warn!(url, final_url = analysis.final_url.as_str(), %reason, "Page blocked");
        }

        let fields = analysis.fields;
        Ok(ExtractedListing {
            title: fields.title,
            address: fields.address,
            price: fields.price,
            noi: fields.noi,
            cap_rate: fields.cap_rate,
            blocked,
            auto_drilled,
            final_url: analysis.final_url,
            screenshot,
        })
    }

    /// Screenshot the final page. Failures are logged and never fail the attempt.
    async fn capture(&self, url: &str) -> Option<String> {
        let timeout = self.config.screenshot_timeout;
        let png = match tokio::time::timeout(timeout, self.renderer.screenshot(url, timeout)).await {
            Ok(Ok(png)) => png,
            Ok(Err(e)) => {
                warn!(url, error = %e, "Screenshot failed");
                return None;
            }
            Err(_) => {
                warn!(url, "Screenshot timed out");
                return None;
            }
        };

        let dir = self.config.screenshot_dir.as_ref()?;
        let hash = content_hash(url);
        let path = dir.join(format!("{}.png", &hash[..16]));
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "Failed to create screenshot dir");
            return None;
        }
        match tokio::fs::write(&path, &png).await {
            Ok(()) => Some(path.display().to_string()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to write screenshot");
                None
            }
        }
    }
}

/// Classify a finished extraction as usable, blocked, or empty.
pub fn check_usable(url: &str, listing: &ExtractedListing) -> Result<(), DealScoutError> {
    if listing.blocked {
        return Err(DealScoutError::ExtractionBlocked { url: url.to_string() });
    }
    if listing.all_fields_empty() {
        return Err(DealScoutError::ExtractionEmpty { url: url.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRenderer;

    const LISTING_URL: &str = "https://www.crexi.com/properties/1523411/texas-dollar-general";

    fn listing_html() -> &'static str {
        r#"<html><head><title>Dollar General | Waco, TX</title></head><body>
            <h1 class="property-name">Dollar General</h1>
            <span data-cy="asking-price">$1,650,000</span>
            <span data-cy="property-address">123 Main St, Waco, TX</span>
            <p>Cap Rate: 6.5%</p></body></html>"#
    }

    fn engine(renderer: Arc<MockRenderer>) -> ExtractionEngine {
        ExtractionEngine::new(renderer, ExtractionConfig::default())
    }

    #[tokio::test]
    async fn detail_page_extracts_fields() {
        let renderer = Arc::new(MockRenderer::new().on_page(LISTING_URL, listing_html()));
        let listing = engine(renderer.clone()).extract(LISTING_URL).await.unwrap();

        assert!(!listing.blocked);
        assert!(!listing.auto_drilled);
        assert_eq!(listing.price, Some(1_650_000.0));
        assert_eq!(listing.cap_rate, Some(6.5));
        assert_eq!(listing.title.as_deref(), Some("Dollar General"));
        assert_eq!(listing.final_url, LISTING_URL);
        assert_eq!(renderer.screenshot_calls(), 1);
        assert!(check_usable(LISTING_URL, &listing).is_ok());
    }

    #[tokio::test]
    async fn access_denied_is_flagged_blocked() {
        let renderer = Arc::new(MockRenderer::new().on_page(
            LISTING_URL,
            "<html><head><title>Access Denied</title></head><body><h1>Access Denied</h1></body></html>",
        ));
        let listing = engine(renderer).extract(LISTING_URL).await.unwrap();
        assert!(listing.blocked);
        assert!(matches!(
            check_usable(LISTING_URL, &listing),
            Err(DealScoutError::ExtractionBlocked { .. })
        ));
    }

    #[tokio::test]
    async fn bounce_to_home_drills_to_requested_listing() {
        let requested = "https://www.crexi.com/properties/1523411";
        let home = r#"<html><head><title>Crexi | Commercial Real Estate for Sale &amp; Lease</title></head>
            <body><h1>Find properties</h1>
            <a href="/properties/2000001/featured">Featured</a>
            <a href="/properties/1523411/texas-dollar-general">Ours</a></body></html>"#;
        let renderer = Arc::new(
            MockRenderer::new()
                .on_redirect(requested, "https://www.crexi.com/", home)
                .on_page(LISTING_URL, listing_html()),
        );
        let listing = engine(renderer.clone()).extract(requested).await.unwrap();
        assert!(listing.auto_drilled);
        assert_eq!(listing.final_url, LISTING_URL);
        assert_eq!(listing.price, Some(1_650_000.0));
        assert_eq!(renderer.load_calls(), 2);
    }

    #[tokio::test]
    async fn load_failure_retries_once_then_times_out() {
        let renderer = Arc::new(MockRenderer::new());
        let err = engine(renderer.clone())
            .extract("https://broker.example.com/missing")
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(renderer.load_calls(), 2);
        assert_eq!(renderer.screenshot_calls(), 0);
    }

    #[tokio::test]
    async fn first_load_failure_recovers_on_relaxed_retry() {
        let renderer = Arc::new(
            MockRenderer::new()
                .on_page(LISTING_URL, listing_html())
                .fail_first_loads(1),
        );
        let listing = engine(renderer.clone()).extract(LISTING_URL).await.unwrap();
        assert!(!listing.blocked);
        assert_eq!(renderer.load_calls(), 2);
        assert_eq!(
            renderer.conditions(),
            vec![LoadCondition::NetworkIdle2, LoadCondition::DomContentLoaded]
        );
    }

    #[tokio::test]
    async fn empty_page_gets_one_second_chance_drill() {
        let list_page = r#"<html><head><title>Retail listings</title></head><body>
            <h2>Results</h2>
            <a href="https://www.crexi.com/properties/1523411/texas-dollar-general">A</a>
            </body></html>"#;
        let renderer = Arc::new(
            MockRenderer::new()
                .on_page("https://broker.example.com/portfolio", list_page)
                .on_page(LISTING_URL, listing_html()),
        );
        let listing = engine(renderer.clone())
            .extract("https://broker.example.com/portfolio")
            .await
            .unwrap();
        assert!(listing.auto_drilled);
        assert_eq!(listing.final_url, LISTING_URL);
        assert_eq!(listing.price, Some(1_650_000.0));
    }

    #[tokio::test]
    async fn screenshot_is_written_when_dir_configured() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new().on_page(LISTING_URL, listing_html()));
        let engine = ExtractionEngine::new(
            renderer,
            ExtractionConfig {
                screenshot_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
        );
        let listing = engine.extract(LISTING_URL).await.unwrap();
        let path = listing.screenshot.expect("screenshot path");
        assert!(std::path::Path::new(&path).exists());
    }
}
