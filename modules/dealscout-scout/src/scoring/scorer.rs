//! Pure scorer over typed signals.

use dealscout_common::{
    LeaseType, ListingSignals, ScoreFactors, ScoreLabel, ScoredCandidate, SearchHit, TenantTier,
    UrlClass,
};

use super::signals::parse_signals;

pub const RELEVANCE_CAP: u32 = 30;
pub const TENANT_CAP: u32 = 20;
pub const LEASE_CAP: u32 = 15;
pub const YIELD_CAP: u32 = 20;
pub const URL_CAP: u32 = 15;

fn relevance(signals: &ListingSignals) -> u32 {
    let keyword_points = (signals.property_keywords.len() as u32).saturating_mul(2);
    let points = if signals.query_terms == 0 {
        (signals.property_keywords.len() as u32).saturating_mul(6)
    } else {
        let total = signals.query_terms as u32;
        let matched = signals.matched_terms.len() as u32;
        // Integer rounding keeps the result independent of float formatting.
        (24 * matched + total / 2) / total + keyword_points.min(6)
    };
    points.min(RELEVANCE_CAP)
}

fn tenant(signals: &ListingSignals) -> u32 {
    let points = match signals.tenant_tier {
        Some(TenantTier::InvestmentGrade) => 20,
        Some(TenantTier::National) => 14,
        Some(TenantTier::Regional) => 8,
        None => 0,
    };
    points.min(TENANT_CAP)
}

fn lease(signals: &ListingSignals) -> u32 {
    let kind = match signals.lease_type {
        Some(LeaseType::AbsoluteNet) => 10,
        Some(LeaseType::TripleNet) => 8,
        Some(LeaseType::DoubleNet) => 4,
        Some(LeaseType::Gross) => 1,
        None => 0,
    };
    let term = match signals.lease_years_remaining {
        Some(y) if y >= 15.0 => 5,
        Some(y) if y >= 10.0 => 4,
        Some(y) if y >= 5.0 => 2,
        _ => 0,
    };
    (kind + term).min(LEASE_CAP)
}

fn yield_points(signals: &ListingSignals) -> u32 {
    let points = match signals.cap_rate_pct {
        // Double-digit caps usually mean distress or a typo.
        Some(c) if c > 10.0 => 12,
        Some(c) if c >= 7.5 => 20,
        Some(c) if c >= 6.0 => 16,
        Some(c) if c >= 5.0 => 12,
        Some(c) if c >= 4.0 => 8,
        Some(_) => 4,
        None if signals.price.is_some() => 4,
        None => 0,
    };
    points.min(YIELD_CAP)
}

fn url(signals: &ListingSignals) -> u32 {
    let points = match signals.url_class {
        UrlClass::Detail => 15,
        UrlClass::Unknown => 6,
        UrlClass::Search | UrlClass::Category => 3,
        UrlClass::Profile | UrlClass::Home => 0,
    };
    points.min(URL_CAP)
}

/// Factor breakdown for already-parsed signals. Each factor is capped and the
/// caps sum to 100.
pub fn factors_for(signals: &ListingSignals) -> ScoreFactors {
    ScoreFactors {
        relevance: relevance(signals),
        tenant: tenant(signals),
        lease: lease(signals),
        yield_: yield_points(signals),
        url: url(signals),
    }
}

/// Score one raw search hit. Deterministic: identical input always produces
/// an identical score, label and factor map.
pub fn score_hit(hit: &SearchHit, query: Option<&str>) -> ScoredCandidate {
    let signals = parse_signals(hit, query);
    let factors = factors_for(&signals);
    let score = factors.sum().min(100);
    ScoredCandidate {
        hit: hit.clone(),
        score,
        label: ScoreLabel::for_score(score),
        factors,
        signals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong_hit() -> SearchHit {
        SearchHit::new(
            "Walgreens | Absolute NNN | 123 Main St, Waco, TX",
            "https://www.crexi.com/properties/1523411/walgreens-waco",
            "Absolute NNN single tenant pharmacy retail, 16 years remaining, $6.9 million at a 7.8% cap rate.",
        )
    }

    #[test]
    fn strong_listing_scores_strong() {
        let scored = score_hit(&strong_hit(), Some("walgreens waco"));
        assert_eq!(scored.factors.tenant, 20);
        assert_eq!(scored.factors.lease, 15);
        assert_eq!(scored.factors.yield_, 20);
        assert_eq!(scored.factors.url, 15);
        assert_eq!(scored.factors.relevance, 30);
        assert_eq!(scored.score, 100);
        assert_eq!(scored.label, ScoreLabel::Strong);
    }

    #[test]
    fn factor_sum_equals_total_and_stays_in_range() {
        let hits = [
            strong_hit(),
            SearchHit::new("", "", ""),
            SearchHit::new(
                "Commercial Real Estate for Sale",
                "https://www.loopnet.com/search/retail-space/tx/for-sale/",
                "Browse 2,000 listings",
            ),
            SearchHit::new(
                "Family Dollar NN",
                "https://broker.example.com/deals/44",
                "Regional retail, cap rate 11.5%",
            ),
        ];
        for hit in &hits {
            for query in [None, Some("dollar store texas")] {
                let scored = score_hit(hit, query);
                assert!(scored.score <= 100);
                assert_eq!(scored.factors.sum(), scored.score);
                assert_eq!(scored.label, ScoreLabel::for_score(scored.score));
            }
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = score_hit(&strong_hit(), Some("walgreens"));
        let b = score_hit(&strong_hit(), Some("walgreens"));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_hit_scores_only_the_unknown_url_floor() {
        let scored = score_hit(&SearchHit::new("", "", ""), None);
        assert_eq!(scored.factors.url, 6);
        assert_eq!(scored.score, 6);
        assert_eq!(scored.label, ScoreLabel::Weak);
    }

    #[test]
    fn search_page_scores_below_detail_page() {
        let detail = score_hit(&strong_hit(), None);
        let mut search = strong_hit();
        search.url = "https://www.crexi.com/properties".into();
        let search = score_hit(&search, None);
        assert!(search.score < detail.score);
        assert_eq!(search.factors.url, 3);
    }

    #[test]
    fn distressed_cap_rate_is_not_rewarded() {
        let mut signals = parse_signals(&strong_hit(), None);
        signals.cap_rate_pct = Some(12.0);
        assert_eq!(factors_for(&signals).yield_, 12);
    }
}
