use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Search ---

/// Raw, untrusted search result from an external provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// Shape of a URL relative to its marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlClass {
    /// Points directly at one listing.
    Detail,
    /// Search results or map view.
    Search,
    /// Category / property-type landing page.
    Category,
    /// Broker or company profile.
    Profile,
    /// Marketplace home page.
    Home,
    /// Domain is not a known marketplace.
    Unknown,
}

impl UrlClass {
    pub fn is_detail(self) -> bool {
        matches!(self, UrlClass::Detail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseType {
    AbsoluteNet,
    TripleNet,
    DoubleNet,
    Gross,
}

/// Typed facts parsed out of a hit's free text and URL. The scorer only
/// ever reads these, never the raw strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSignals {
    pub tenant: Option<String>,
    pub tenant_tier: Option<TenantTier>,
    pub cap_rate_pct: Option<f64>,
    pub price: Option<f64>,
    pub lease_type: Option<LeaseType>,
    pub lease_years_remaining: Option<f64>,
    pub url_class: UrlClass,
    pub marketplace: Option<String>,
    pub location: Option<String>,
    /// Query terms found in title/snippet, lowercased and deduplicated.
    pub matched_terms: Vec<String>,
    /// Total distinct query terms considered.
    pub query_terms: usize,
    pub property_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantTier {
    /// Investment-grade credit (pharmacy, big box, QSR majors).
    InvestmentGrade,
    National,
    Regional,
}

// --- Scoring ---

/// Named sub-scores. Each is individually capped and the sum is the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub relevance: u32,
    pub tenant: u32,
    pub lease: u32,
    #[serde(rename = "yield")]
    pub yield_: u32,
    pub url: u32,
}

impl ScoreFactors {
    pub fn sum(&self) -> u32 {
        self.relevance + self.tenant + self.lease + self.yield_ + self.url
    }

    pub fn as_map(&self) -> BTreeMap<&'static str, u32> {
        BTreeMap::from([
            ("relevance", self.relevance),
            ("tenant", self.tenant),
            ("lease", self.lease),
            ("yield", self.yield_),
            ("url", self.url),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLabel {
    Strong,
    Promising,
    Speculative,
    Weak,
}

impl ScoreLabel {
    pub fn for_score(score: u32) -> Self {
        match score {
            75.. => ScoreLabel::Strong,
            55..=74 => ScoreLabel::Promising,
            35..=54 => ScoreLabel::Speculative,
            _ => ScoreLabel::Weak,
        }
    }
}

impl std::fmt::Display for ScoreLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreLabel::Strong => write!(f, "strong"),
            ScoreLabel::Promising => write!(f, "promising"),
            ScoreLabel::Speculative => write!(f, "speculative"),
            ScoreLabel::Weak => write!(f, "weak"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub hit: SearchHit,
    pub score: u32,
    pub label: ScoreLabel,
    pub factors: ScoreFactors,
    pub signals: ListingSignals,
}

// --- Extraction ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedListing {
    pub title: Option<String>,
    pub address: Option<String>,
    pub price: Option<f64>,
    pub noi: Option<f64>,
    pub cap_rate: Option<f64>,
    pub blocked: bool,
    pub auto_drilled: bool,
    pub final_url: String,
    /// Path of the diagnostic screenshot, when one was written.
    pub screenshot: Option<String>,
}

impl ExtractedListing {
    pub fn all_fields_empty(&self) -> bool {
        self.title.is_none()
            && self.address.is_none()
            && self.price.is_none()
            && self.noi.is_none()
            && self.cap_rate.is_none()
    }

    /// Not blocked and at least one field came back.
    pub fn is_usable(&self) -> bool {
        !self.blocked && !self.all_fields_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Underwriting {
    pub cap_rate: Option<f64>,
    pub noi: Option<f64>,
    pub loan_amount: Option<f64>,
    pub annual_debt_service: Option<f64>,
    pub dscr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub candidate: ScoredCandidate,
    pub listing: ExtractedListing,
    pub underwriting: Underwriting,
}

// --- Runs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    FinishedOk,
    FinishedFailed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::FinishedOk | RunState::FinishedFailed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub query: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Extract,
    ScoreOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    pub query: String,
    pub hits_returned: usize,
    pub hits_kept: usize,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub strong: usize,
    pub promising: usize,
    pub speculative: usize,
    pub weak: usize,
    pub mean: f64,
    pub median: f64,
    pub max: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub candidates: usize,
    pub scores: ScoreDistribution,
    /// Location label → candidate count. Unlocated candidates are under "unknown".
    pub geography: BTreeMap<String, usize>,
    pub avg_cap_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    pub query: String,
    pub mode: RunMode,
    pub marketplace: Option<String>,
    pub max_candidates: usize,
    pub stages: Vec<StageSummary>,
    pub candidates_considered: usize,
    pub summary: Option<PortfolioSummary>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub plan: RunPlan,
    pub deals: Vec<Deal>,
}

// --- Risk ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborSignal {
    /// Unemployment rate, percent.
    pub rate: f64,
    /// Change over the trailing three months, percentage points.
    pub delta_3m: f64,
    /// Metro name when the figure is metro-level; national otherwise.
    #[serde(default)]
    pub metro: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroSignals {
    pub ten_year_yield: Option<f64>,
    pub ten_year_mom_bps: Option<f64>,
    pub curve_spread: Option<f64>,
    pub cpi_yoy: Option<f64>,
    pub labor: Option<LaborSignal>,
    pub negative_news: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub factors: Vec<RiskFactor>,
    pub categories: usize,
    pub note: String,
}

// --- Watchlists ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watchlist {
    pub id: String,
    pub label: String,
    pub query: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub min_score: u32,
    #[serde(default = "default_risk_max")]
    pub risk_max: f64,
    #[serde(default)]
    pub schedule: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_risk_max() -> f64 {
    100.0
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub url: String,
    pub score: u32,
    pub risk: f64,
    pub title: String,
    pub price: Option<f64>,
    pub cap_rate: Option<f64>,
}

impl SnapshotItem {
    /// True when any tracked field differs. Title is informational only.
    pub fn tracked_fields_differ(&self, other: &SnapshotItem) -> bool {
        self.score != other.score
            || self.risk != other.risk
            || self.price != other.price
            || self.cap_rate != other.cap_rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub watchlist_id: String,
    pub taken_at: DateTime<Utc>,
    pub items: Vec<SnapshotItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub new: Vec<SnapshotItem>,
    pub changed: Vec<SnapshotItem>,
    pub removed: Vec<String>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn alertable(&self) -> usize {
        self.new.len() + self.changed.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    pub title: String,
    pub url: String,
    pub score: u32,
    pub risk: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotification {
    pub watchlist_id: String,
    pub watchlist_label: String,
    pub new_count: usize,
    pub changed_count: usize,
    pub removed_count: usize,
    pub sample: Vec<AlertItem>,
    pub at: DateTime<Utc>,
}
