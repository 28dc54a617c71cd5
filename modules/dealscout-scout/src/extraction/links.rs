use std::sync::LazyLock;

use regex::Regex;

use crate::infra::util::canonical_url;
use crate::marketplace;

/// Matches `href` attributes.
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

/// Numeric path segment long enough to be a listing id.
static ID_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4,}$").expect("valid id regex"));

/// Resolve a raw href against a base URL, returning an absolute URL with fragment stripped.
fn resolve_href(raw: &str, base: Option<&url::Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with("javascript:") || raw.starts_with("mailto:") || raw.starts_with("tel:") {
        return None;
    }
    let mut parsed = if raw.starts_with("http://") || raw.starts_with("https://") {
        url::Url::parse(raw).ok()?
    } else {
        base?.join(raw).ok()?
    };
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Extract all links from raw HTML `href` attributes, resolved against
/// `base_url` and deduplicated in document order.
pub fn extract_all_links(html: &str, base_url: &str) -> Vec<String> {
    let base = url::Url::parse(base_url).ok();
    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for cap in HREF_RE.captures_iter(html) {
        let raw = &cap[1];
        if let Some(resolved) = resolve_href(raw, base.as_ref()) {
            if seen.insert(resolved.clone()) {
                links.push(resolved);
            }
        }
    }

    links
}

/// Links on the page shaped like a single marketplace listing, excluding the
/// page itself.
pub fn detail_links(html: &str, page_url: &str) -> Vec<String> {
    let current = canonical_url(page_url);
    extract_all_links(html, page_url)
        .into_iter()
        .filter(|link| marketplace::is_detail_url(link))
        .filter(|link| canonical_url(link) != current)
        .collect()
}

/// Trailing numeric id of a listing URL (`/properties/1523411/slug` → `1523411`).
pub fn listing_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    segments
        .iter()
        .rev()
        .find(|s| ID_SEGMENT_RE.is_match(s))
        .map(|s| s.to_string())
}

/// Choose where to drill from a bounced or empty page: the detail link that
/// carries the requested listing's id, else the first detail link.
pub fn pick_drill_target(html: &str, page_url: &str, requested_url: &str) -> Option<String> {
    let candidates = detail_links(html, page_url);
    if let Some(id) = listing_id(requested_url) {
        if let Some(hit) = candidates.iter().find(|link| {
            url::Url::parse(link)
                .ok()
                .and_then(|u| u.path_segments().map(|mut s| s.any(|seg| seg == id)))
                .unwrap_or(false)
        }) {
            return Some(hit.clone());
        }
    }
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn href_links_are_resolved_and_deduplicated() {
        let html = r##"
            <a href="/properties/1523411/tx-dollar-general">A</a>
            <a href='/properties/1523411/tx-dollar-general#photos'>A again</a>
            <a href="javascript:void(0)">nope</a>
            <a href="https://www.loopnet.com/Listing/9-Elm-St/31234567/">B</a>
        "##;
        let links = extract_all_links(html, "https://www.crexi.com/properties");
        assert_eq!(
            links,
            vec![
                "https://www.crexi.com/properties/1523411/tx-dollar-general",
                "https://www.loopnet.com/Listing/9-Elm-St/31234567/",
            ]
        );
    }

    #[test]
    fn non_detail_links_are_dropped() {
        let html = r#"
            <a href="/search">Search</a>
            <a href="/profile/jane">Broker</a>
            <a href="/properties/2000001/walgreens">Listing</a>
        "#;
        assert_eq!(
            detail_links(html, "https://www.crexi.com/"),
            vec!["https://www.crexi.com/properties/2000001/walgreens"]
        );
    }

    #[test]
    fn listing_id_is_last_numeric_segment() {
        assert_eq!(
            listing_id("https://www.crexi.com/properties/1523411/texas-dollar-general"),
            Some("1523411".into())
        );
        assert_eq!(listing_id("https://www.crexi.com/"), None);
    }

    #[test]
    fn drill_prefers_link_with_requested_id() {
        let html = r#"
            <a href="/properties/2000001/featured">Featured</a>
            <a href="/properties/1523411/texas-dollar-general">Ours</a>
        "#;
        let target = pick_drill_target(
            html,
            "https://www.crexi.com/",
            "https://www.crexi.com/properties/1523411/texas-dollar-general",
        );
        assert_eq!(
            target.as_deref(),
            Some("https://www.crexi.com/properties/1523411/texas-dollar-general")
        );
    }

    #[test]
    fn drill_falls_back_to_first_detail_link() {
        let html = r#"<a href="/properties/2000001/featured">Featured</a>"#;
        let target = pick_drill_target(
            html,
            "https://www.crexi.com/",
            "https://www.crexi.com/properties/1523411/x",
        );
        assert_eq!(
            target.as_deref(),
            Some("https://www.crexi.com/properties/2000001/featured")
        );
        assert_eq!(pick_drill_target("<p>nothing</p>", "https://www.crexi.com/", ""), None);
    }
}
