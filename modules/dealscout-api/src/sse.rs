//! SSE endpoints: per-run progress events and the watchlist alert feed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use dealscout_common::{EventKind, ProgressEvent, RunResult, RunState};

use crate::AppState;

fn progress_event(event: &ProgressEvent) -> Event {
    let event = Event::default()
        .event(event.kind.name())
        .id(event.seq.to_string())
        .json_data(event);
    event.unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// Completion for a run that finished before the client connected.
fn replayed_completion(run_id: &str, state: RunState, result: Option<&RunResult>) -> Event {
    let kind = EventKind::Completion {
        ok: state == RunState::FinishedOk,
        deals_found: result.map(|r| r.deals.len()).unwrap_or(0),
        message: result.map(|r| r.plan.message.clone()).unwrap_or_default(),
        stages: result.map(|r| r.plan.stages.clone()).unwrap_or_default(),
    };
    let mut body = serde_json::to_value(&kind).unwrap_or_default();
    if let Some(fields) = body.as_object_mut() {
        fields.insert("run_id".into(), run_id.into());
        fields.insert("replayed".into(), true.into());
    }
    Event::default()
        .event(kind.name())
        .json_data(body)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// GET /api/runs/{id}/events
///
/// Live events from subscription onward, ending with the completion event.
/// A run that is already terminal gets a single replayed completion.
pub async fn run_events(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(run) = state.controller.get_run(&id).await else {
        return (StatusCode::NOT_FOUND, format!("Run not found: {id}")).into_response();
    };

    let stream: BoxStream<'static, Result<Event, Infallible>> = if run.state.is_terminal() {
        let result = state.controller.get_result(&id).await.ok().flatten();
        let event = replayed_completion(&id, run.state, result.as_ref());
        stream::once(async move { Ok(event) }).boxed()
    } else {
        let subscription = state.controller.subscribe(&id);
        // Finished between the lookup and the subscribe: the bus is closed.
        match state.controller.get_run(&id).await {
            Some(now) if now.state.is_terminal() => {
                drop(subscription);
                let result = state.controller.get_result(&id).await.ok().flatten();
                let event = replayed_completion(&id, now.state, result.as_ref());
                stream::once(async move { Ok(event) }).boxed()
            }
            _ => {
                debug!(run_id = id.as_str(), "SSE client attached to run");
                subscription
                    .map(|event| Ok(progress_event(&event)))
                    .boxed()
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// GET /api/alerts/stream
pub async fn alert_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut rx = state.notifier.subscribe();

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().event("connected").data("ok"));
        loop {
            match rx.recv().await {
                Ok(alert) => match Event::default().event("alert").json_data(&alert) {
                    Ok(event) => {
                        yield Ok(event);
                    }
                    Err(e) => warn!(error = %e, "Failed to encode alert"),
                },
                Err(RecvError::Lagged(missed)) => {
                    yield Ok(Event::default()
                        .event("lagged")
                        .data(serde_json::json!({ "missed": missed }).to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

