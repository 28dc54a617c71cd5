//! Run Controller: drives one interactive request through
//! cascade → scoring → extraction, publishing every step to the event bus.
//!
//! `pending → running → finished-ok | finished-failed`. Stage failures
//! degrade in place; only bookkeeping failures, cancellation, or a panicked
//! task finish a run as failed.

pub mod store;
pub mod summary;
pub mod underwriting;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use dealscout_common::{
    DealScoutError, Deal, EventKind, PropertyStage, Run, RunMode, RunPlan, RunResult, RunState,
    ScoredCandidate,
};

use crate::events::{EventBus, Subscription};
use crate::extraction::{check_usable, ExtractionEngine};
use crate::marketplace;
use crate::search::{CascadeRequest, SearchCascade};

pub use store::{MemoryRunStore, RunError, RunStore};
pub use summary::{describe, summarize};
pub use underwriting::{underwrite, LoanTerms};

const CANCELLED_MESSAGE: &str = "Run cancelled";

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Candidates attempted in extract mode.
    pub max_candidates: usize,
    /// Candidates kept from the cascade (and summarized in score-only mode).
    pub result_cap: usize,
    pub mode: RunMode,
    /// Per-stage search deadline; the cascade default when unset.
    pub search_timeout: Option<Duration>,
    pub loan: LoanTerms,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_candidates: 8,
            result_cap: 20,
            mode: RunMode::Extract,
            search_timeout: None,
            loan: LoanTerms::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    /// Overrides the configured mode.
    pub mode: Option<RunMode>,
    /// Preferred marketplace; otherwise inferred from the query text.
    pub marketplace: Option<String>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: None,
            marketplace: None,
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// What `execute` produced before terminal bookkeeping.
struct Outcome {
    result: RunResult,
    cancelled: bool,
}

#[derive(Clone)]
pub struct RunController {
    cascade: Arc<SearchCascade>,
    extractor: Arc<ExtractionEngine>,
    store: Arc<dyn RunStore>,
    bus: EventBus,
    config: RunConfig,
    cancels: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
}

impl RunController {
    pub fn new(
        cascade: Arc<SearchCascade>,
        extractor: Arc<ExtractionEngine>,
        store: Arc<dyn RunStore>,
        bus: EventBus,
        config: RunConfig,
    ) -> Self {
        Self {
            cascade,
            extractor,
            store,
            bus,
            config,
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self, run_id: &str) -> Subscription {
        self.bus.subscribe(run_id)
    }

    fn cancels(&self) -> MutexGuard<'_, HashMap<String, Arc<AtomicBool>>> {
        self.cancels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the run and return its id immediately; the pipeline runs as an
    /// independent task.
    pub async fn start_run(&self, request: RunRequest) -> Result<String, RunError> {
        let (run_id, cancel) = self.create(&request).await?;
        let controller = self.clone();
        let id = run_id.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.drive(id.clone(), request, cancel).await {
                error!(run_id = id.as_str(), error = %e, "Run finished with bookkeeping failure");
            }
        });
        Ok(run_id)
    }

    /// Run to completion and return the stored result.
    pub async fn run_sync(&self, request: RunRequest) -> Result<RunResult, RunError> {
        let (run_id, cancel) = self.create(&request).await?;
        self.drive(run_id, request, cancel).await
    }

    pub async fn get_run(&self, run_id: &str) -> Option<Run> {
        self.store.get(run_id).await
    }

    /// `Ok(None)` while the run is still in progress.
    pub async fn get_result(&self, run_id: &str) -> Result<Option<RunResult>, RunError> {
        if self.store.get(run_id).await.is_none() {
            return Err(RunError::NotFound(run_id.to_string()));
        }
        Ok(self.store.result(run_id).await)
    }

    /// Signal a live run to stop at its next checkpoint. Returns false when
    /// the run already finished.
    pub async fn cancel_run(&self, run_id: &str) -> Result<bool, RunError> {
        let flag = self.cancels().get(run_id).cloned();
        if let Some(flag) = flag {
            flag.store(true, Ordering::SeqCst);
            info!(run_id, "Run cancellation requested");
            return Ok(true);
        }
        match self.store.get(run_id).await {
            Some(_) => Ok(false),
            None => Err(RunError::NotFound(run_id.to_string())),
        }
    }

    async fn create(&self, request: &RunRequest) -> Result<(String, Arc<AtomicBool>), RunError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.store
            .create(Run {
                id: run_id.clone(),
                query: request.query.clone(),
                state: RunState::Pending,
                created_at: Utc::now(),
            })
            .await?;
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancels().insert(run_id.clone(), cancel.clone());
        info!(run_id = run_id.as_str(), query = request.query.as_str(), "Run created");
        Ok((run_id, cancel))
    }

    /// Execute on a child task so a panic is caught, then finish the run.
    async fn drive(
        &self,
        run_id: String,
        request: RunRequest,
        cancel: Arc<AtomicBool>,
    ) -> Result<RunResult, RunError> {
        let fallback = self.plan_for(&request);
        let controller = self.clone();
        let id = run_id.clone();
        let task = tokio::spawn(async move { controller.execute(&id, &request, &cancel).await });
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(RunError::TaskFailed(e.to_string())),
        };
        self.finish(&run_id, fallback, outcome).await
    }

    fn plan_for(&self, request: &RunRequest) -> RunPlan {
        let marketplace = request.marketplace.clone().or_else(|| {
            marketplace::mentioned_in(&request.query).map(|m| m.domain.to_string())
        });
        RunPlan {
            query: request.query.clone(),
            mode: request.mode.unwrap_or(self.config.mode),
            marketplace,
            max_candidates: self.config.max_candidates,
            stages: Vec::new(),
            candidates_considered: 0,
            summary: None,
            message: String::new(),
        }
    }

    fn publish(&self, run_id: &str, kind: EventKind) {
        self.bus.publish(run_id, kind);
    }

    fn progress(
        &self,
        run_id: &str,
        index: usize,
        total: usize,
        url: &str,
        stage: PropertyStage,
        deal: Option<Box<Deal>>,
    ) {
        self.publish(
            run_id,
            EventKind::PropertyProgress {
                index,
                total,
                url: url.to_string(),
                stage,
                deal,
            },
        );
    }

    async fn execute(
        &self,
        run_id: &str,
        request: &RunRequest,
        cancel: &AtomicBool,
    ) -> Result<Outcome, RunError> {
        self.store.set_state(run_id, RunState::Running).await?;
        let mut plan = self.plan_for(request);
        info!(run_id, query = plan.query.as_str(), mode = ?plan.mode, "Run started");

        self.publish(run_id, EventKind::status(format!("Searching listings for \"{}\"", plan.query)));
        if let Some(market) = &plan.marketplace {
            self.publish(run_id, EventKind::note(format!("Preferring {market} listings")));
        }

        let mut cascade_request = CascadeRequest::new(plan.query.clone(), self.config.result_cap)
            .with_marketplace(plan.marketplace.clone());
        if let Some(timeout) = self.config.search_timeout {
            cascade_request = cascade_request.with_timeout(timeout);
        }
        let bus = self.bus.clone();
        let id = run_id.to_string();
        let cascade = self
            .cascade
            .run_with(&cascade_request, Some(cancel), move |stage| {
                let mut note = format!(
                    "Search stage {}: kept {} of {} hits",
                    stage.stage, stage.hits_kept, stage.hits_returned
                );
                if stage.timed_out {
                    note.push_str(" (timed out)");
                }
                bus.publish(&id, EventKind::note(note));
            })
            .await;

        plan.stages = cascade.stages;
        plan.candidates_considered = cascade.candidates.len();
        let mut deals = Vec::new();

        if cascade.cancelled || cancel.load(Ordering::SeqCst) {
            plan.message = CANCELLED_MESSAGE.to_string();
            return Ok(Outcome {
                result: RunResult { plan, deals },
                cancelled: true,
            });
        }

        for (i, candidate) in cascade.candidates.iter().enumerate() {
            self.publish(
                run_id,
                EventKind::SourceFound {
                    title: candidate.hit.title.clone(),
                    url: candidate.hit.url.clone(),
                    score: candidate.score,
                    rank: i + 1,
                },
            );
        }

        if cascade.candidates.is_empty() {
            plan.message = format!(
                "No matching listings found for \"{}\" after {} search stage(s).",
                plan.query,
                plan.stages.len()
            );
            return Ok(Outcome {
                result: RunResult { plan, deals },
                cancelled: false,
            });
        }

        match plan.mode {
            RunMode::ScoreOnly => {
                let summary = summarize(&cascade.candidates);
                self.publish(run_id, EventKind::AnswerFragment { text: describe(&summary) });
                plan.message = format!("Scored {} candidates.", summary.candidates);
                plan.summary = Some(summary);
            }
            RunMode::Extract => {
                let total = cascade.candidates.len().min(self.config.max_candidates);
                self.publish(run_id, EventKind::status(format!("Checking {total} listings")));
                for (index, candidate) in cascade.candidates.iter().take(total).enumerate() {
                    if cancel.load(Ordering::SeqCst) {
                        plan.message = CANCELLED_MESSAGE.to_string();
                        return Ok(Outcome {
                            result: RunResult { plan, deals },
                            cancelled: true,
                        });
                    }
                    if let Some(deal) = self.attempt(run_id, index, total, candidate).await {
                        deals.push(deal);
                    }
                }
                if !deals.is_empty() {
                    self.publish(run_id, EventKind::AnswerFragment { text: deals_text(&deals) });
                }
                plan.message = if deals.is_empty() {
                    format!("Checked {total} listings; none returned usable data.")
                } else {
                    format!("Found {} deal(s) across {total} listings checked.", deals.len())
                };
            }
        }

        Ok(Outcome {
            result: RunResult { plan, deals },
            cancelled: false,
        })
    }

    /// One extraction attempt. Unusable pages are reported and skipped.
    async fn attempt(
        &self,
        run_id: &str,
        index: usize,
        total: usize,
        candidate: &ScoredCandidate,
    ) -> Option<Deal> {
        let url = candidate.hit.url.as_str();
        self.progress(run_id, index, total, url, PropertyStage::Loading, None);
        self.publish(run_id, EventKind::Navigation { url: url.to_string() });

        let listing = match self.extractor.extract(url).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(run_id, url, error = %e, "Extraction failed");
                self.progress(run_id, index, total, url, PropertyStage::Failed, None);
                return None;
            }
        };
        if listing.final_url != url {
            self.publish(
                run_id,
                EventKind::Navigation {
                    url: listing.final_url.clone(),
                },
            );
        }

        match check_usable(url, &listing) {
            Ok(()) => {
                let deal = Deal {
                    candidate: candidate.clone(),
                    underwriting: underwrite(&listing, &self.config.loan),
                    listing,
                };
                self.progress(
                    run_id,
                    index,
                    total,
                    url,
                    PropertyStage::Complete,
                    Some(Box::new(deal.clone())),
                );
                Some(deal)
            }
            Err(e) => {
                let stage = match e {
                    DealScoutError::ExtractionBlocked { .. } => PropertyStage::Blocked,
                    _ => PropertyStage::Empty,
                };
                info!(run_id, url, error = %e, "No usable listing data");
                self.progress(run_id, index, total, url, stage, None);
                None
            }
        }
    }

    /// Store the result, settle the state, emit the terminal event, and
    /// release per-run resources. Runs for every outcome.
    async fn finish(
        &self,
        run_id: &str,
        fallback: RunPlan,
        outcome: Result<Outcome, RunError>,
    ) -> Result<RunResult, RunError> {
        let (result, state, failure) = match outcome {
            Ok(Outcome {
                result,
                cancelled: false,
            }) => (result, RunState::FinishedOk, None),
            Ok(Outcome {
                result,
                cancelled: true,
            }) => (result, RunState::FinishedFailed, None),
            Err(e) => {
                error!(run_id, error = %e, "Run failed");
                let mut plan = fallback;
                plan.message = format!("Run failed: {e}");
                (
                    RunResult {
                        plan,
                        deals: Vec::new(),
                    },
                    RunState::FinishedFailed,
                    Some(e),
                )
            }
        };

        if let Err(e) = self.store.save_result(run_id, result.clone()).await {
            error!(run_id, error = %e, "Failed to store run result");
        }
        if let Err(e) = self.store.set_state(run_id, state).await {
            error!(run_id, error = %e, "Failed to record run state");
        }

        self.publish(
            run_id,
            EventKind::Completion {
                ok: state == RunState::FinishedOk,
                deals_found: result.deals.len(),
                message: result.plan.message.clone(),
                stages: result.plan.stages.clone(),
            },
        );
        self.cancels().remove(run_id);
        self.bus.close(run_id);
        info!(
            run_id,
            state = ?state,
            deals = result.deals.len(),
            message = result.plan.message.as_str(),
            "Run finished"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }
}

fn deals_text(deals: &[Deal]) -> String {
    deals
        .iter()
        .map(|d| {
            let title = d
                .listing
                .title
                .as_deref()
                .unwrap_or(d.candidate.hit.title.as_str());
            let mut line = format!("- {title} (score {})", d.candidate.score);
            if let Some(price) = d.listing.price {
                line.push_str(&format!(", ${price:.0}"));
            }
            if let Some(cap) = d.underwriting.cap_rate {
                line.push_str(&format!(", {cap:.2}% cap"));
            }
            if let Some(dscr) = d.underwriting.dscr {
                line.push_str(&format!(", DSCR {dscr:.2}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
