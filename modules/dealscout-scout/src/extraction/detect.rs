use std::sync::LazyLock;

use regex::Regex;

use dealscout_common::UrlClass;

use crate::marketplace;

static ACCESS_DENIED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(access denied|access to this page has been denied|attention required|just a moment\.\.\.|are you a robot|verify you are (a )?human|captcha|request blocked|403 forbidden|pardon our interruption|unusual traffic)")
        .expect("valid block regex")
});

/// Body text longer than this is treated as real content even if it
/// mentions a challenge phrase somewhere.
const CHALLENGE_BODY_MAX: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    EmptyTitle,
    AccessDenied,
    /// Rendered without any price text, address element, or heading.
    BareShell,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::EmptyTitle => write!(f, "empty title"),
            BlockReason::AccessDenied => write!(f, "access denied"),
            BlockReason::BareShell => write!(f, "bare shell"),
        }
    }
}

/// Structural facts about a rendered page used by block detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellSignals {
    pub has_price_text: bool,
    pub has_address_element: bool,
    pub has_heading: bool,
}

pub fn detect_block(title: Option<&str>, body_text: &str, shell: ShellSignals) -> Option<BlockReason> {
    let title = title.map(str::trim).unwrap_or_default();
    if title.is_empty() {
        return Some(BlockReason::EmptyTitle);
    }
    if ACCESS_DENIED_RE.is_match(title)
        || (body_text.len() <= CHALLENGE_BODY_MAX && ACCESS_DENIED_RE.is_match(body_text))
    {
        return Some(BlockReason::AccessDenied);
    }
    if !shell.has_price_text && !shell.has_address_element && !shell.has_heading {
        return Some(BlockReason::BareShell);
    }
    None
}

/// The page landed on a marketplace home/category/search page (or carries a
/// generic marketplace title) instead of a listing.
pub fn is_bounced(final_url: &str, title: Option<&str>) -> bool {
    let landed_on_index = marketplace::lookup(final_url).is_some()
        && matches!(
            marketplace::classify_url(final_url),
            UrlClass::Home | UrlClass::Category | UrlClass::Search
        );
    landed_on_index || title.is_some_and(marketplace::is_generic_marketplace_title)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_shell() -> ShellSignals {
        ShellSignals {
            has_price_text: true,
            has_address_element: true,
            has_heading: true,
        }
    }

    #[test]
    fn access_denied_title_is_blocked() {
        assert_eq!(
            detect_block(Some("Access Denied"), "", full_shell()),
            Some(BlockReason::AccessDenied)
        );
        assert_eq!(
            detect_block(Some("Just a moment..."), "", full_shell()),
            Some(BlockReason::AccessDenied)
        );
    }

    #[test]
    fn challenge_in_short_body_is_blocked() {
        assert_eq!(
            detect_block(Some("crexi.com"), "Please verify you are a human", full_shell()),
            Some(BlockReason::AccessDenied)
        );
    }

    #[test]
    fn long_body_mentioning_captcha_is_not_blocked() {
        let body = format!("{} captcha", "listing details ".repeat(200));
        assert_eq!(detect_block(Some("Walgreens"), &body, full_shell()), None);
    }

    #[test]
    fn empty_title_and_bare_shell() {
        assert_eq!(
            detect_block(Some("  "), "x", full_shell()),
            Some(BlockReason::EmptyTitle)
        );
        assert_eq!(
            detect_block(Some("Loading"), "", ShellSignals::default()),
            Some(BlockReason::BareShell)
        );
    }

    #[test]
    fn bounce_is_detected_by_url_or_title() {
        assert!(is_bounced("https://www.crexi.com/", None));
        assert!(is_bounced("https://www.loopnet.com/search/retail/", Some("x")));
        assert!(!is_bounced(
            "https://www.crexi.com/properties/1523411/x",
            Some("Walgreens | Waco, TX")
        ));
        assert!(is_bounced(
            "https://www.crexi.com/properties/1523411/x",
            Some("Crexi | Commercial Real Estate for Sale & Lease")
        ));
        assert!(!is_bounced("https://broker.example.com/", Some("Home")));
    }
}
