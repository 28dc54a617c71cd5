//! Search Cascade: progressively broader queries until enough candidates
//! pass the score bar.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use dealscout_common::{DealScoutError, ScoredCandidate, SearchHit, StageSummary};

use crate::infra::util::{canonical_url, host_matches, host_of};
use crate::marketplace;
use crate::scoring::score_hit;
use crate::traits::WebSearcher;

#[derive(Debug, Clone)]
pub struct CascadeConfig {
    /// Score a candidate needs to count toward `min_passing`.
    pub min_score: u32,
    /// Stop widening once this many candidates pass.
    pub min_passing: usize,
    /// Results requested from the provider per stage.
    pub per_stage_results: usize,
    pub timeout: Duration,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            min_score: 40,
            min_passing: 2,
            per_stage_results: 10,
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CascadeRequest {
    pub query: String,
    /// Preferred marketplace (domain or display name).
    pub marketplace: Option<String>,
    pub cap: usize,
    /// Overrides the configured per-stage timeout.
    pub timeout: Option<Duration>,
    /// Only hits on these domains are kept when non-empty.
    pub domains: Vec<String>,
}

impl CascadeRequest {
    pub fn new(query: impl Into<String>, cap: usize) -> Self {
        Self {
            query: query.into(),
            marketplace: None,
            cap,
            timeout: None,
            domains: Vec::new(),
        }
    }

    pub fn with_marketplace(mut self, marketplace: Option<String>) -> Self {
        self.marketplace = marketplace;
        self
    }

    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = domains;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CascadeOutcome {
    /// Ranked, deduplicated, truncated to the request cap.
    pub candidates: Vec<ScoredCandidate>,
    pub stages: Vec<StageSummary>,
    pub cancelled: bool,
    /// Stages ran but none got a provider response (every call errored or
    /// timed out). An empty candidate list then says nothing about the market.
    pub all_stages_failed: bool,
}

/// One planned search stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub name: &'static str,
    pub query: String,
}

fn normalize_domain(domain: &str) -> String {
    domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .trim_end_matches('/')
        .to_lowercase()
}

fn site_clause(domains: &[String]) -> String {
    match domains {
        [] => String::new(),
        [one] => format!("site:{one}"),
        many => format!(
            "({})",
            many.iter()
                .map(|d| format!("site:{d}"))
                .collect::<Vec<_>>()
                .join(" OR ")
        ),
    }
}

fn join_query(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The stage queries for a request, narrowest first.
pub fn stage_queries(request: &CascadeRequest) -> Vec<StagePlan> {
    let allow_list: Vec<String> = request
        .domains
        .iter()
        .map(|d| normalize_domain(d))
        .filter(|d| !d.is_empty())
        .collect();
    let all_known: Vec<String> = marketplace::catalog()
        .iter()
        .map(|m| m.domain.to_string())
        .collect();
    let allowed = if allow_list.is_empty() {
        all_known
    } else {
        allow_list.clone()
    };

    let preferred = request
        .marketplace
        .as_deref()
        .and_then(marketplace::by_domain)
        .map(|m| m.domain.to_string())
        .filter(|d| allow_list.is_empty() || allow_list.contains(d));
    let narrow = match preferred {
        Some(domain) => vec![domain],
        None => allowed.clone(),
    };

    let query = request.query.trim();
    vec![
        StagePlan {
            name: "narrow",
            query: join_query(&[query, &site_clause(&narrow)]),
        },
        StagePlan {
            name: "broad",
            query: join_query(&[query, "commercial property for sale", &site_clause(&allowed)]),
        },
        StagePlan {
            name: "broadest",
            query: join_query(&[query, "NNN investment property for sale", &site_clause(&allow_list)]),
        },
    ]
}

/// Known marketplaces only contribute detail-shaped URLs; unknown domains are
/// kept. An allow-list restricts hosts outright.
fn admissible(hit: &SearchHit, allow_list: &[String]) -> bool {
    let Some(host) = host_of(&hit.url) else {
        return false;
    };
    if !allow_list.is_empty() && !allow_list.iter().any(|d| host_matches(&host, d)) {
        return false;
    }
    match marketplace::lookup(&hit.url) {
        Some(_) => marketplace::is_detail_url(&hit.url),
        None => true,
    }
}

/// Source priority, then score descending, then url.
pub fn rank(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by_cached_key(|c| {
        (
            marketplace::priority_of(&c.hit.url),
            Reverse(c.score),
            canonical_url(&c.hit.url),
        )
    });
}

pub struct SearchCascade {
    searcher: Arc<dyn WebSearcher>,
    config: CascadeConfig,
}

impl SearchCascade {
    pub fn new(searcher: Arc<dyn WebSearcher>, config: CascadeConfig) -> Self {
        Self { searcher, config }
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub async fn run(&self, request: &CascadeRequest) -> CascadeOutcome {
        self.run_with(request, None, |_| {}).await
    }

    /// Run the cascade. `cancel` is checked before each stage; `on_stage` sees
    /// each stage summary as soon as that stage finishes.
    pub async fn run_with(
        &self,
        request: &CascadeRequest,
        cancel: Option<&AtomicBool>,
        mut on_stage: impl FnMut(&StageSummary) + Send,
    ) -> CascadeOutcome {
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let allow_list: Vec<String> = request
            .domains
            .iter()
            .map(|d| normalize_domain(d))
            .filter(|d| !d.is_empty())
            .collect();

        let mut outcome = CascadeOutcome::default();
        let mut seen = HashSet::new();
        let mut ranked: Vec<ScoredCandidate> = Vec::new();
        let mut answered = false;

        for stage in stage_queries(request) {
            if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
                info!(query = request.query.as_str(), stage = stage.name, "Cascade cancelled");
                outcome.cancelled = true;
                break;
            }

            let (hits, timed_out) = match self.search_stage(&stage.query, timeout).await {
                Ok(hits) => {
                    answered = true;
                    (hits, false)
                }
                Err(timed_out) => (Vec::new(), timed_out),
            };
            let hits_returned = hits.len();
            let mut hits_kept = 0;
            for hit in hits {
                if !admissible(&hit, &allow_list) {
                    continue;
                }
                if !seen.insert(canonical_url(&hit.url)) {
                    continue;
                }
                ranked.push(score_hit(&hit, Some(&request.query)));
                hits_kept += 1;
            }

            let summary = StageSummary {
                stage: stage.name.to_string(),
                query: stage.query.clone(),
                hits_returned,
                hits_kept,
                timed_out,
            };
            info!(
                stage = stage.name,
                query = stage.query.as_str(),
                hits_returned,
                hits_kept,
                timed_out,
                "Cascade stage complete"
            );
            on_stage(&summary);
            outcome.stages.push(summary);

            let passing = ranked
                .iter()
                .filter(|c| c.score >= self.config.min_score)
                .count();
            if passing >= self.config.min_passing {
                break;
            }
        }

        outcome.all_stages_failed = !outcome.stages.is_empty() && !answered;
        rank(&mut ranked);
        ranked.truncate(request.cap);
        outcome.candidates = ranked;
        outcome
    }

    /// One provider call under its own deadline. `Err(timed_out)` when the
    /// provider gave no answer; the stage then contributes no hits.
    async fn search_stage(&self, query: &str, timeout: Duration) -> Result<Vec<SearchHit>, bool> {
        let call = self.searcher.search(query, self.config.per_stage_results);
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(hits)) => Ok(hits),
            Ok(Err(e)) => {
                let err = DealScoutError::SearchProviderError(e.to_string());
                warn!(query, error = %err, "Search stage failed");
                Err(false)
            }
            Err(_) => {
                let err = DealScoutError::SearchTimeout {
                    query: query.to_string(),
                    timeout,
                };
                warn!(error = %err, "Search stage timed out");
                Err(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_marketplace_narrows_first_stage() {
        let request = CascadeRequest::new("dollar general texas", 10)
            .with_marketplace(Some("LoopNet".into()));
        let stages = stage_queries(&request);
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].query, "dollar general texas site:loopnet.com");
        assert!(stages[1].query.starts_with("dollar general texas commercial property for sale (site:crexi.com OR"));
        assert_eq!(
            stages[2].query,
            "dollar general texas NNN investment property for sale"
        );
    }

    #[test]
    fn allow_list_restricts_every_stage() {
        let request = CascadeRequest::new("walgreens", 10)
            .with_domains(vec!["https://www.crexi.com/".into()]);
        let stages = stage_queries(&request);
        assert!(stages.iter().all(|s| s.query.ends_with("site:crexi.com")));
    }

    #[test]
    fn preference_outside_allow_list_is_ignored() {
        let request = CascadeRequest::new("walgreens", 10)
            .with_marketplace(Some("loopnet.com".into()))
            .with_domains(vec!["crexi.com".into()]);
        assert_eq!(stage_queries(&request)[0].query, "walgreens site:crexi.com");
    }

    #[test]
    fn marketplace_hits_must_be_detail_pages() {
        let detail = SearchHit::new("x", "https://www.crexi.com/properties/1523411/x", "");
        let search = SearchHit::new("x", "https://www.crexi.com/properties", "");
        let unknown = SearchHit::new("x", "https://broker.example.com/anything", "");
        assert!(admissible(&detail, &[]));
        assert!(!admissible(&search, &[]));
        assert!(admissible(&unknown, &[]));
        assert!(!admissible(&unknown, &["crexi.com".to_string()]));
        assert!(!admissible(&SearchHit::new("x", "not a url", ""), &[]));
    }

    #[test]
    fn ranking_orders_by_priority_then_score_then_url() {
        let mut candidates: Vec<ScoredCandidate> = [
            ("https://broker.example.com/a", "Walgreens NNN"),
            ("https://www.loopnet.com/Listing/1-Main-St/31234567/", "Retail"),
            ("https://www.crexi.com/properties/2000002/b", "Retail"),
            ("https://www.crexi.com/properties/2000001/a", "Walgreens absolute NNN 7% cap"),
        ]
        .iter()
        .map(|(url, title)| score_hit(&SearchHit::new(*title, *url, ""), None))
        .collect();

        rank(&mut candidates);
        let urls: Vec<&str> = candidates.iter().map(|c| c.hit.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.crexi.com/properties/2000001/a",
                "https://www.crexi.com/properties/2000002/b",
                "https://www.loopnet.com/Listing/1-Main-St/31234567/",
                "https://broker.example.com/a",
            ]
        );
    }
}
