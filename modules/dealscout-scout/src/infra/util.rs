// Shared URL and hashing helpers for the scout pipeline.

use sha2::{Digest, Sha256};

/// Identity key for a listing URL: lowercased scheme+host with `www.` dropped,
/// query string and fragment stripped, trailing slash trimmed.
///
/// Unparseable input falls back to the trimmed, lowercased string minus
/// anything after `?` or `#`, so it still dedups consistently.
pub fn canonical_url(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(mut parsed) = url::Url::parse(raw) else {
        let cut = raw.find(|c: char| c == '?' || c == '#').unwrap_or(raw.len());
        return raw[..cut].trim_end_matches('/').to_lowercase();
    };

    parsed.set_query(None);
    parsed.set_fragment(None);

    let host = parsed
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_lowercase())
        .unwrap_or_default();
    let path = parsed.path().trim_end_matches('/');

    format!("{}://{}{}", parsed.scheme(), host, path)
}

/// Registrable-ish host of a URL without `www.`, lowercased.
pub fn host_of(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    parsed
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_lowercase())
}

/// True when `host` is `domain` or a subdomain of it.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches("www.");
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Hex SHA-256 of arbitrary text.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Truncate to at most `max` chars on a char boundary.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_strips_query_fragment_and_www() {
        assert_eq!(
            canonical_url("https://www.LoopNet.com/Listing/123-Main-St/555/?utm_source=x#photos"),
            "https://loopnet.com/Listing/123-Main-St/555"
        );
    }

    #[test]
    fn canonical_url_equates_trailing_slash_variants() {
        assert_eq!(
            canonical_url("https://www.crexi.com/properties/101/texas-dollar-general/"),
            canonical_url("https://crexi.com/properties/101/texas-dollar-general")
        );
    }

    #[test]
    fn canonical_url_handles_unparseable_input() {
        assert_eq!(canonical_url("not a url?x=1"), "not a url");
    }

    #[test]
    fn host_matching_accepts_subdomains_only() {
        assert!(host_matches("crexi.com", "crexi.com"));
        assert!(host_matches("api.crexi.com", "www.crexi.com"));
        assert!(!host_matches("notcrexi.com", "crexi.com"));
    }

    #[test]
    fn content_hash_deterministic() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("world"));
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("café latte", 4), "café");
        assert_eq!(truncate("short", 10), "short");
    }
}
