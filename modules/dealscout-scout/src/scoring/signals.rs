//! Typed signal parser: raw hit text → `ListingSignals`.
//!
//! All string heuristics live here so the scorer only ever reads typed fields.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use dealscout_common::{LeaseType, ListingSignals, SearchHit, TenantTier};

use super::money::{find_all_money, find_cap_rate};
use crate::marketplace;

/// Minimum figure treated as an asking price rather than rent or NOI noise.
const MIN_PLAUSIBLE_PRICE: f64 = 50_000.0;

struct Tenant {
    name: &'static str,
    tier: TenantTier,
    pattern: Regex,
}

fn tenant(name: &'static str, tier: TenantTier, aliases: &[&str]) -> Tenant {
    let alternation = aliases
        .iter()
        .map(|a| regex::escape(a))
        .collect::<Vec<_>>()
        .join("|");
    Tenant {
        name,
        tier,
        pattern: Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("valid tenant regex"),
    }
}

static TENANTS: LazyLock<Vec<Tenant>> = LazyLock::new(|| {
    use TenantTier::*;
    vec![
        tenant("Walgreens", InvestmentGrade, &["walgreens"]),
        tenant("CVS", InvestmentGrade, &["cvs", "cvs pharmacy"]),
        tenant("Dollar General", InvestmentGrade, &["dollar general", "dg market"]),
        tenant("7-Eleven", InvestmentGrade, &["7-eleven", "7 eleven", "seven eleven"]),
        tenant("McDonald's", InvestmentGrade, &["mcdonald's", "mcdonalds"]),
        tenant("Starbucks", InvestmentGrade, &["starbucks"]),
        tenant("O'Reilly Auto Parts", InvestmentGrade, &["o'reilly", "oreilly"]),
        tenant("AutoZone", InvestmentGrade, &["autozone"]),
        tenant("Home Depot", InvestmentGrade, &["home depot"]),
        tenant("Lowe's", InvestmentGrade, &["lowe's", "lowes"]),
        tenant("Walmart", InvestmentGrade, &["walmart"]),
        tenant("FedEx", InvestmentGrade, &["fedex"]),
        tenant("Tractor Supply", InvestmentGrade, &["tractor supply"]),
        tenant("Chick-fil-A", InvestmentGrade, &["chick-fil-a", "chick fil a"]),
        tenant("Dollar Tree", National, &["dollar tree"]),
        tenant("Family Dollar", National, &["family dollar"]),
        tenant("Taco Bell", National, &["taco bell"]),
        tenant("Wendy's", National, &["wendy's", "wendys"]),
        tenant("Burger King", National, &["burger king"]),
        tenant("Advance Auto Parts", National, &["advance auto"]),
        tenant("Dunkin'", National, &["dunkin", "dunkin'"]),
        tenant("Aldi", National, &["aldi"]),
        tenant("Jiffy Lube", National, &["jiffy lube"]),
        tenant("Take 5 Oil Change", National, &["take 5"]),
        tenant("Verizon", National, &["verizon"]),
        tenant("Planet Fitness", National, &["planet fitness"]),
        tenant("Whataburger", Regional, &["whataburger"]),
        tenant("Sheetz", Regional, &["sheetz"]),
        tenant("Wawa", Regional, &["wawa"]),
        tenant("Casey's", Regional, &["casey's", "caseys"]),
        tenant("Bojangles", Regional, &["bojangles"]),
        tenant("Culver's", Regional, &["culver's", "culvers"]),
    ]
});

static LEASE_PATTERNS: LazyLock<Vec<(LeaseType, Regex)>> = LazyLock::new(|| {
    vec![
        (
            LeaseType::AbsoluteNet,
            Regex::new(r"(?i)\b(absolute\s*(net|nnn)|abs\.?\s*nnn)\b").expect("valid lease regex"),
        ),
        (
            LeaseType::TripleNet,
            Regex::new(r"(?i)\b(nnn|triple[\s-]?net)\b").expect("valid lease regex"),
        ),
        (
            LeaseType::DoubleNet,
            Regex::new(r"(?i)\b(nn|double[\s-]?net)\b").expect("valid lease regex"),
        ),
        (
            LeaseType::Gross,
            Regex::new(r"(?i)\b((modified\s+)?gross\s+lease|full[\s-]service\s+gross)\b")
                .expect("valid lease regex"),
        ),
    ]
});

/// "12 years remaining", "10+ yrs left", "8.5 years of term".
static YEARS_REMAINING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2}(?:\.\d+)?)\+?\s*(?:years?|yrs?)\s+(?:remaining|left|remain|of\s+(?:primary\s+)?term)")
        .expect("valid years regex")
});

/// "15-year NNN lease", "new 20 yr absolute net lease".
static LEASE_TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2})[\s-]?(?:year|yr)\s+(?:(?:absolute|abs|new|nnn|triple[\s-]net|net|corporate|ground)\s+)*lease")
        .expect("valid lease term regex")
});

/// "Waco, TX" style hint. Case sensitive on purpose for the state code.
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][A-Za-z.'-]+(?:\s+[A-Z][A-Za-z.'-]+){0,2}),\s*([A-Z]{2})\b")
        .expect("valid location regex")
});

const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC",
];

const PROPERTY_KEYWORDS: &[&str] = &[
    "retail",
    "office",
    "industrial",
    "warehouse",
    "medical",
    "restaurant",
    "qsr",
    "pharmacy",
    "gas station",
    "convenience",
    "automotive",
    "bank",
    "shopping center",
    "strip center",
    "single tenant",
    "multi-tenant",
    "flex",
    "self storage",
    "land",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "at", "for", "in", "near", "of", "on", "or", "the", "to", "with", "sale",
    "buy", "find", "me", "property", "properties",
];

/// Lowercased alphanumeric tokens (apostrophes kept inside words).
fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Distinct, meaningful query terms in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokens(query)
        .into_iter()
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn match_tenant(text: &str) -> Option<&'static Tenant> {
    let normalized = text.replace('\u{2019}', "'");
    TENANTS.iter().find(|t| t.pattern.is_match(&normalized))
}

fn match_lease_type(text: &str) -> Option<LeaseType> {
    LEASE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(kind, _)| *kind)
}

fn lease_years(text: &str) -> Option<f64> {
    let caps = YEARS_REMAINING_RE
        .captures(text)
        .or_else(|| LEASE_TERM_RE.captures(text))?;
    let years = caps.get(1)?.as_str().parse::<f64>().ok()?;
    (years > 0.0 && years < 100.0).then_some(years)
}

fn location_hint(text: &str) -> Option<String> {
    LOCATION_RE.captures_iter(text).find_map(|caps| {
        let state = caps.get(2)?.as_str();
        if !US_STATES.contains(&state) {
            return None;
        }
        let city = caps.get(1)?.as_str().trim();
        Some(format!("{city}, {state}"))
    })
}

fn property_keywords(lower: &str) -> Vec<String> {
    PROPERTY_KEYWORDS
        .iter()
        .filter(|kw| {
            let pattern = format!(r"\b{}\b", regex::escape(kw));
            Regex::new(&pattern).is_ok_and(|re| re.is_match(lower))
        })
        .map(|kw| kw.to_string())
        .collect()
}

/// Parse every typed signal the scorer consumes out of one hit.
pub fn parse_signals(hit: &SearchHit, query: Option<&str>) -> ListingSignals {
    let text = format!("{} {}", hit.title, hit.snippet);
    let lower = text.to_lowercase();

    let tenant = match_tenant(&text);

    let price = find_all_money(&text)
        .into_iter()
        .find(|v| *v >= MIN_PLAUSIBLE_PRICE);

    let terms = query.map(query_terms).unwrap_or_default();
    let haystack: BTreeSet<String> = tokens(&text).into_iter().collect();
    let matched_terms = terms
        .iter()
        .filter(|t| haystack.contains(*t))
        .cloned()
        .collect();

    ListingSignals {
        tenant: tenant.map(|t| t.name.to_string()),
        tenant_tier: tenant.map(|t| t.tier),
        cap_rate_pct: find_cap_rate(&text),
        price,
        lease_type: match_lease_type(&text),
        lease_years_remaining: lease_years(&text),
        url_class: marketplace::classify_url(&hit.url),
        marketplace: marketplace::lookup(&hit.url).map(|m| m.name.to_string()),
        location: location_hint(&text),
        matched_terms,
        query_terms: terms.len(),
        property_keywords: property_keywords(&lower),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealscout_common::UrlClass;

    fn hit(title: &str, url: &str, snippet: &str) -> SearchHit {
        SearchHit::new(title, url, snippet)
    }

    #[test]
    fn parses_a_typical_nnn_listing() {
        let signals = parse_signals(
            &hit(
                "Dollar General | 123 Main St, Waco, TX",
                "https://www.crexi.com/properties/1523411/texas-dollar-general",
                "Absolute NNN retail. 14 years remaining. Offered at $1.65 million, 6.75% cap.",
            ),
            Some("dollar general texas"),
        );

        assert_eq!(signals.tenant.as_deref(), Some("Dollar General"));
        assert_eq!(signals.tenant_tier, Some(TenantTier::InvestmentGrade));
        assert_eq!(signals.lease_type, Some(LeaseType::AbsoluteNet));
        assert_eq!(signals.lease_years_remaining, Some(14.0));
        assert_eq!(signals.cap_rate_pct, Some(6.75));
        assert_eq!(signals.price, Some(1_650_000.0));
        assert_eq!(signals.url_class, UrlClass::Detail);
        assert_eq!(signals.marketplace.as_deref(), Some("Crexi"));
        assert_eq!(signals.location.as_deref(), Some("Waco, TX"));
        assert_eq!(signals.query_terms, 3);
        assert_eq!(signals.matched_terms, vec!["dollar", "general"]);
        assert!(signals.property_keywords.contains(&"retail".to_string()));
    }

    #[test]
    fn triple_net_does_not_read_as_double_net() {
        assert_eq!(match_lease_type("Corporate NNN lease"), Some(LeaseType::TripleNet));
        assert_eq!(match_lease_type("NN lease, roof by landlord"), Some(LeaseType::DoubleNet));
        assert_eq!(match_lease_type("Modified gross lease"), Some(LeaseType::Gross));
        assert_eq!(match_lease_type("Vacant building"), None);
    }

    #[test]
    fn lease_term_phrasing_is_recognized() {
        assert_eq!(lease_years("New 15-year NNN lease"), Some(15.0));
        assert_eq!(lease_years("10+ yrs left on the primary term"), Some(10.0));
        assert_eq!(lease_years("Built in 2019"), None);
    }

    #[test]
    fn tenant_matching_respects_word_boundaries() {
        assert_eq!(match_tenant("Walgreens drugstore").map(|t| t.name), Some("Walgreens"));
        assert!(match_tenant("Caldi's bistro").is_none());
        assert_eq!(
            match_tenant("McDonald\u{2019}s ground lease").map(|t| t.name),
            Some("McDonald's")
        );
    }

    #[test]
    fn location_requires_a_real_state_code() {
        assert_eq!(location_hint("Strip center in Tulsa, OK"), Some("Tulsa, OK".into()));
        assert_eq!(location_hint("Price, NOI and more"), None);
    }

    #[test]
    fn small_figures_are_not_prices() {
        let signals = parse_signals(
            &hit("Retail pad", "https://example.com/listing", "Rent $4,500 per month"),
            None,
        );
        assert_eq!(signals.price, None);
        assert_eq!(signals.query_terms, 0);
        assert!(signals.matched_terms.is_empty());
        assert_eq!(signals.url_class, UrlClass::Unknown);
    }

    #[test]
    fn query_terms_drop_stopwords_and_duplicates() {
        assert_eq!(
            query_terms("Dollar General for sale in Texas, dollar"),
            vec!["dollar", "general", "texas"]
        );
    }
}
