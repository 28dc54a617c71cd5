//! Run Controller end-to-end against mock search and rendering.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use dealscout_common::{EventKind, ProgressEvent, PropertyStage, RunMode, RunState};
use dealscout_scout::events::EventBus;
use dealscout_scout::extraction::{ExtractionConfig, ExtractionEngine};
use dealscout_scout::run::{MemoryRunStore, RunConfig, RunController, RunError, RunRequest};
use dealscout_scout::search::{CascadeConfig, SearchCascade};
use dealscout_scout::testing::{hit, listing_page, MockRenderer, MockSearcher};

const BLOCKED_URL: &str = "https://www.crexi.com/properties/1000001/dollar-general-waco";
const GOOD_URL: &str = "https://www.crexi.com/properties/1000002/dollar-general-tyler";

const ACCESS_DENIED: &str =
    "<html><head><title>Access Denied</title></head><body><h1>Access Denied</h1></body></html>";

fn controller(searcher: Arc<MockSearcher>, renderer: Arc<MockRenderer>, mode: RunMode) -> RunController {
    RunController::new(
        Arc::new(SearchCascade::new(searcher, CascadeConfig::default())),
        Arc::new(ExtractionEngine::new(renderer, ExtractionConfig::default())),
        Arc::new(MemoryRunStore::new()),
        EventBus::new(Duration::from_secs(3600)),
        RunConfig {
            mode,
            ..Default::default()
        },
    )
}

fn two_listings() -> MockSearcher {
    MockSearcher::new().otherwise(vec![
        hit(
            "Dollar General | Absolute NNN | 7% Cap | $1,500,000",
            BLOCKED_URL,
            "Waco, TX. 14 years remaining on corporate lease.",
        ),
        hit("Dollar General NNN", GOOD_URL, "Tyler, TX retail"),
    ])
}

async fn drain(controller: &RunController, run_id: &str) -> Vec<ProgressEvent> {
    let subscription = controller.subscribe(run_id);
    tokio::time::timeout(Duration::from_secs(5), subscription.collect::<Vec<_>>())
        .await
        .expect("run finished before timeout")
}

#[tokio::test]
async fn zero_hits_completes_with_no_deals_and_no_extraction() {
    let searcher = Arc::new(MockSearcher::new());
    let renderer = Arc::new(MockRenderer::new());
    let controller = controller(searcher.clone(), renderer.clone(), RunMode::Extract);

    let result = controller
        .run_sync(RunRequest::new("unicorn self storage in antarctica"))
        .await
        .unwrap();

    assert!(result.deals.is_empty());
    assert_eq!(result.plan.candidates_considered, 0);
    assert_eq!(result.plan.stages.len(), 3);
    assert!(result.plan.message.starts_with("No matching listings found"));
    assert_eq!(searcher.calls(), 3);
    assert_eq!(renderer.load_calls(), 0);
}

#[tokio::test]
async fn zero_hit_run_still_emits_terminal_event() {
    let controller = controller(
        Arc::new(MockSearcher::new()),
        Arc::new(MockRenderer::new()),
        RunMode::Extract,
    );
    let run_id = controller.start_run(RunRequest::new("nothing here")).await.unwrap();
    let events = drain(&controller, &run_id).await;

    match &events.last().expect("events").kind {
        EventKind::Completion { ok, deals_found, message, .. } => {
            assert!(*ok);
            assert_eq!(*deals_found, 0);
            assert!(message.contains("nothing here"));
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(
        controller.get_run(&run_id).await.unwrap().state,
        RunState::FinishedOk
    );
}

#[tokio::test]
async fn blocked_page_is_flagged_and_run_moves_on() {
    let renderer = Arc::new(
        MockRenderer::new()
            .on_page(BLOCKED_URL, ACCESS_DENIED)
            .on_page(
                GOOD_URL,
                &listing_page("Dollar General", "$1,650,000", "88 Broadway Ave, Tyler, TX", "6.5%"),
            ),
    );
    let controller = controller(Arc::new(two_listings()), renderer.clone(), RunMode::Extract);

    let run_id = controller.start_run(RunRequest::new("dollar general")).await.unwrap();
    let events = drain(&controller, &run_id).await;

    let stages: Vec<(usize, PropertyStage)> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::PropertyProgress { index, stage, .. } if *stage != PropertyStage::Loading => {
                Some((*index, *stage))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![(0, PropertyStage::Blocked), (1, PropertyStage::Complete)]
    );
    assert_eq!(renderer.loaded_urls(), vec![BLOCKED_URL, GOOD_URL]);

    let result = controller.get_result(&run_id).await.unwrap().expect("terminal result");
    assert_eq!(result.deals.len(), 1);
    let deal = &result.deals[0];
    assert_eq!(deal.listing.final_url, GOOD_URL);
    assert_eq!(deal.listing.price, Some(1_650_000.0));
    assert_eq!(deal.underwriting.cap_rate, Some(6.5));
    assert_eq!(deal.underwriting.noi, Some(107_250.0));
    assert!(deal.underwriting.dscr.is_some());
}

#[tokio::test]
async fn subscribers_see_ordered_events_ending_in_completion() {
    let renderer = Arc::new(MockRenderer::new().on_page(
        GOOD_URL,
        &listing_page("Dollar General", "$1,650,000", "88 Broadway Ave, Tyler, TX", "6.5%"),
    ));
    let controller = controller(Arc::new(two_listings()), renderer, RunMode::Extract);

    let run_id = controller.start_run(RunRequest::new("dollar general")).await.unwrap();
    let first = controller.subscribe(&run_id);
    let second = controller.subscribe(&run_id);
    let (a, b) = tokio::time::timeout(
        Duration::from_secs(5),
        futures::future::join(first.collect::<Vec<_>>(), second.collect::<Vec<_>>()),
    )
    .await
    .unwrap();

    let seqs: Vec<u64> = a.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..a.len() as u64).collect::<Vec<_>>());
    assert_eq!(
        a.iter().map(|e| e.seq).collect::<Vec<_>>(),
        b.iter().map(|e| e.seq).collect::<Vec<_>>()
    );
    assert!(a.windows(2).all(|w| w[0].ts <= w[1].ts));

    assert_eq!(a.first().unwrap().kind.name(), "status");
    assert!(a.last().unwrap().kind.is_terminal());
    assert_eq!(a.iter().filter(|e| e.kind.is_terminal()).count(), 1);

    let first_source = a.iter().position(|e| e.kind.name() == "source_found").unwrap();
    let first_progress = a.iter().position(|e| e.kind.name() == "property_progress").unwrap();
    assert!(first_source < first_progress);
}

#[tokio::test]
async fn score_only_mode_summarizes_without_loading_pages() {
    let renderer = Arc::new(MockRenderer::new());
    let controller = controller(Arc::new(two_listings()), renderer.clone(), RunMode::ScoreOnly);

    let result = controller.run_sync(RunRequest::new("dollar general")).await.unwrap();

    assert!(result.deals.is_empty());
    assert_eq!(result.plan.mode, RunMode::ScoreOnly);
    let summary = result.plan.summary.expect("summary");
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.avg_cap_rate, Some(7.0));
    assert_eq!(renderer.load_calls(), 0);
}

#[tokio::test]
async fn request_mode_overrides_configured_mode() {
    let renderer = Arc::new(MockRenderer::new());
    let controller = controller(Arc::new(two_listings()), renderer.clone(), RunMode::Extract);
    let result = controller
        .run_sync(RunRequest::new("dollar general").with_mode(RunMode::ScoreOnly))
        .await
        .unwrap();
    assert!(result.plan.summary.is_some());
    assert_eq!(renderer.load_calls(), 0);
}

#[tokio::test]
async fn cancelled_run_finishes_failed_with_message() {
    let searcher = Arc::new(two_listings());
    let controller = controller(searcher.clone(), Arc::new(MockRenderer::new()), RunMode::Extract);

    let run_id = controller.start_run(RunRequest::new("dollar general")).await.unwrap();
    assert!(controller.cancel_run(&run_id).await.unwrap());
    let events = drain(&controller, &run_id).await;

    match &events.last().unwrap().kind {
        EventKind::Completion { ok, message, .. } => {
            assert!(!*ok);
            assert_eq!(message, "Run cancelled");
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(searcher.calls(), 0);
    assert_eq!(
        controller.get_run(&run_id).await.unwrap().state,
        RunState::FinishedFailed
    );
    assert!(!controller.cancel_run(&run_id).await.unwrap());
}

#[tokio::test]
async fn result_is_hidden_until_terminal_and_unknown_runs_error() {
    let controller = controller(
        Arc::new(MockSearcher::new()),
        Arc::new(MockRenderer::new()),
        RunMode::Extract,
    );
    let run_id = controller.start_run(RunRequest::new("anything")).await.unwrap();
    assert!(controller.get_result(&run_id).await.unwrap().is_none());

    drain(&controller, &run_id).await;
    assert!(controller.get_result(&run_id).await.unwrap().is_some());

    assert!(matches!(
        controller.get_result("no-such-run").await,
        Err(RunError::NotFound(_))
    ));
    assert!(matches!(
        controller.cancel_run("no-such-run").await,
        Err(RunError::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_page_load_is_reported_and_skipped() {
    let renderer = Arc::new(MockRenderer::new().on_page(
        GOOD_URL,
        &listing_page("Dollar General", "$1,650,000", "88 Broadway Ave, Tyler, TX", "6.5%"),
    ));
    let controller = controller(Arc::new(two_listings()), renderer, RunMode::Extract);

    let run_id = controller.start_run(RunRequest::new("dollar general")).await.unwrap();
    let events = drain(&controller, &run_id).await;

    assert!(events.iter().any(|e| matches!(
        e.kind,
        EventKind::PropertyProgress { index: 0, stage: PropertyStage::Failed, .. }
    )));
    let result = controller.get_result(&run_id).await.unwrap().unwrap();
    assert_eq!(result.deals.len(), 1);
}
