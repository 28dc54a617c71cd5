//! Per-marketplace knowledge: source priority, URL shapes, selectors.

use std::sync::LazyLock;

use regex::Regex;

use dealscout_common::UrlClass;

use crate::infra::util::{host_matches, host_of};

pub struct Marketplace {
    pub domain: &'static str,
    pub name: &'static str,
    /// Lower ranks sort first when ordering candidates.
    pub priority: u8,
    detail: Regex,
    search: Regex,
    category: Regex,
    profile: Regex,
    pub price_selectors: &'static [&'static str],
    pub address_selectors: &'static [&'static str],
    pub title_selectors: &'static [&'static str],
}

/// Sort rank for hits on domains outside the catalog.
pub const UNKNOWN_PRIORITY: u8 = 99;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid marketplace regex")
}

static CATALOG: LazyLock<Vec<Marketplace>> = LazyLock::new(|| {
    vec![
        Marketplace {
            domain: "crexi.com",
            name: "Crexi",
            priority: 0,
            detail: re(r"(?i)^/properties/\d+(/[^/]+)?/?$"),
            search: re(r"(?i)^/(properties|search)/?$|^/properties/(search|map)"),
            category: re(r"(?i)^/(lease|categories|property-types)(/|$)"),
            profile: re(r"(?i)^/(profile|brokerage|brokers?)(/|$)"),
            price_selectors: &["[data-cy='asking-price']", ".property-price", ".asking-price"],
            address_selectors: &["[data-cy='property-address']", ".property-address"],
            title_selectors: &["h1.property-name", "h1"],
        },
        Marketplace {
            domain: "loopnet.com",
            name: "LoopNet",
            priority: 1,
            detail: re(r"(?i)^/listing/[^/]+/\d+/?$"),
            search: re(r"(?i)^/search(/|$)"),
            category: re(r"(?i)^/(commercial-real-estate|[a-z-]+-for-(sale|lease))(/|$)"),
            profile: re(r"(?i)^/(company|profile|commercial-real-estate-brokers)(/|$)"),
            price_selectors: &[".price-amount", "[data-testid='price']", ".profile-hero-price"],
            address_selectors: &[".profile-hero-sub-title", "[data-testid='address']"],
            title_selectors: &["h1.profile-hero-title", "h1"],
        },
        Marketplace {
            domain: "ten-x.com",
            name: "Ten-X",
            priority: 2,
            detail: re(r"(?i)^/commercial/property/[^/]+/\d+/?$"),
            search: re(r"(?i)^/(search|commercial/search)(/|$)"),
            category: re(r"(?i)^/commercial/(retail|office|industrial|multifamily)/?$"),
            profile: re(r"(?i)^/(broker|company)(/|$)"),
            price_selectors: &[".starting-bid", ".price"],
            address_selectors: &[".property-address"],
            title_selectors: &["h1"],
        },
        Marketplace {
            domain: "brevitas.com",
            name: "Brevitas",
            priority: 3,
            detail: re(r"(?i)^/p/[^/]+/?$"),
            search: re(r"(?i)^/(search|listings)(/|$)"),
            category: re(r"(?i)^/(retail|office|industrial|nnn)(/|$)"),
            profile: re(r"(?i)^/(u|brokers?)(/|$)"),
            price_selectors: &[".listing-price", ".price"],
            address_selectors: &[".listing-address"],
            title_selectors: &["h1"],
        },
    ]
});

/// Titles that marketplaces serve on their home/search landing pages.
static GENERIC_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^\s*(crexi|loopnet|ten-x|brevitas)?\s*[|:-]?\s*(commercial real estate (for sale|listings|marketplace|& property)|properties for (sale|lease)|search results|find commercial)")
});

pub fn catalog() -> &'static [Marketplace] {
    &CATALOG
}

pub fn lookup(url: &str) -> Option<&'static Marketplace> {
    let host = host_of(url)?;
    CATALOG.iter().find(|m| host_matches(&host, m.domain))
}

pub fn by_domain(domain: &str) -> Option<&'static Marketplace> {
    let domain = domain.trim().trim_start_matches("www.").to_lowercase();
    CATALOG
        .iter()
        .find(|m| m.domain == domain || m.name.eq_ignore_ascii_case(&domain))
}

/// Marketplace mentioned by name or domain anywhere in free text.
pub fn mentioned_in(text: &str) -> Option<&'static Marketplace> {
    let lower = text.to_lowercase();
    CATALOG.iter().find(|m| {
        lower.contains(m.domain) || lower.contains(&m.name.to_lowercase())
    })
}

pub fn priority_of(url: &str) -> u8 {
    lookup(url).map(|m| m.priority).unwrap_or(UNKNOWN_PRIORITY)
}

impl Marketplace {
    pub fn classify_path(&self, path: &str) -> UrlClass {
        let trimmed = path.trim();
        if trimmed.is_empty() || trimmed == "/" {
            UrlClass::Home
        } else if self.detail.is_match(trimmed) {
            UrlClass::Detail
        } else if self.profile.is_match(trimmed) {
            UrlClass::Profile
        } else if self.search.is_match(trimmed) {
            UrlClass::Search
        } else if self.category.is_match(trimmed) {
            UrlClass::Category
        } else {
            // Unrecognized path on a known marketplace is treated as a
            // category-like landing page, never as a listing.
            UrlClass::Category
        }
    }
}

/// Classify a URL's shape. Unknown domains return `UrlClass::Unknown`.
pub fn classify_url(url: &str) -> UrlClass {
    let Some(market) = lookup(url) else {
        return UrlClass::Unknown;
    };
    match url::Url::parse(url.trim()) {
        Ok(parsed) => market.classify_path(parsed.path()),
        Err(_) => UrlClass::Unknown,
    }
}

/// True for a known marketplace URL shaped like a single listing.
pub fn is_detail_url(url: &str) -> bool {
    classify_url(url) == UrlClass::Detail
}

pub fn is_generic_marketplace_title(title: &str) -> bool {
    GENERIC_TITLE_RE.is_match(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopnet_listing_is_detail() {
        assert_eq!(
            classify_url("https://www.loopnet.com/Listing/123-Main-St-Austin-TX/31234567/"),
            UrlClass::Detail
        );
    }

    #[test]
    fn crexi_property_with_slug_is_detail() {
        assert_eq!(
            classify_url("https://www.crexi.com/properties/1523411/texas-dollar-general"),
            UrlClass::Detail
        );
    }

    #[test]
    fn search_and_profile_pages_are_not_detail() {
        assert_eq!(
            classify_url("https://www.loopnet.com/search/retail-space/austin-tx/for-sale/"),
            UrlClass::Search
        );
        assert_eq!(
            classify_url("https://www.crexi.com/profile/jane-broker-123"),
            UrlClass::Profile
        );
        assert_eq!(
            classify_url("https://www.loopnet.com/commercial-real-estate/texas/"),
            UrlClass::Category
        );
        assert_eq!(classify_url("https://www.crexi.com/"), UrlClass::Home);
    }

    #[test]
    fn unknown_domain_is_unknown() {
        assert_eq!(
            classify_url("https://www.example-broker.com/listing/44"),
            UrlClass::Unknown
        );
        assert_eq!(priority_of("https://www.example-broker.com/x"), UNKNOWN_PRIORITY);
    }

    #[test]
    fn marketplaces_resolve_by_name_or_domain() {
        assert_eq!(by_domain("www.LoopNet.com").unwrap().name, "LoopNet");
        assert_eq!(by_domain("crexi").unwrap().domain, "crexi.com");
        assert_eq!(
            mentioned_in("walgreens nnn on crexi").unwrap().domain,
            "crexi.com"
        );
        assert!(mentioned_in("walgreens nnn texas").is_none());
    }

    #[test]
    fn generic_home_titles_are_recognized() {
        assert!(is_generic_marketplace_title(
            "Crexi | Commercial Real Estate for Sale & Lease"
        ));
        assert!(is_generic_marketplace_title("LoopNet: Commercial Real Estate Listings"));
        assert!(!is_generic_marketplace_title("Dollar General | 123 Main St, Waco, TX"));
    }
}
