use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::warn;

use dealscout_common::RunMode;
use dealscout_scout::run::{RunError, RunRequest};
use dealscout_scout::watchlist::WatchlistSource;

use crate::AppState;

pub const MAX_QUERY_LEN: usize = 500;

#[derive(Deserialize)]
pub struct StartRunBody {
    query: String,
    mode: Option<RunMode>,
    marketplace: Option<String>,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn run_error(e: RunError) -> Response {
    match e {
        RunError::NotFound(id) => error(StatusCode::NOT_FOUND, format!("Run not found: {id}")),
        other => {
            warn!(error = %other, "Run request failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// Validate the body into a request, or the 400 to return.
fn run_request(body: StartRunBody) -> Result<RunRequest, Response> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "query must not be empty"));
    }
    if query.len() > MAX_QUERY_LEN {
        return Err(error(
            StatusCode::BAD_REQUEST,
            format!("query too long (max {MAX_QUERY_LEN} characters)"),
        ));
    }
    Ok(RunRequest {
        query: query.to_string(),
        mode: body.mode,
        marketplace: body.marketplace.filter(|m| !m.trim().is_empty()),
    })
}

pub async fn api_start_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartRunBody>,
) -> Response {
    let request = match run_request(body) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match state.controller.start_run(request).await {
        Ok(run_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "run_id": run_id })),
        )
            .into_response(),
        Err(e) => run_error(e),
    }
}

pub async fn api_run_sync(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartRunBody>,
) -> Response {
    let request = match run_request(body) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match state.controller.run_sync(request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => run_error(e),
    }
}

pub async fn api_run_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.controller.get_run(&id).await {
        Some(run) => Json(run).into_response(),
        None => run_error(RunError::NotFound(id)),
    }
}

pub async fn api_run_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.controller.get_result(&id).await {
        Ok(Some(result)) => Json(result).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, format!("Run {id} has not finished")),
        Err(e) => run_error(e),
    }
}

pub async fn api_cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.controller.cancel_run(&id).await {
        Ok(cancelled) => Json(serde_json::json!({ "cancelled": cancelled })).into_response(),
        Err(e) => run_error(e),
    }
}

pub async fn api_trigger_watchlist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.watchlists.get(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error(StatusCode::NOT_FOUND, format!("Watchlist not found: {id}")),
        Err(e) => {
            warn!(error = %e, "Failed to read watchlists");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read watchlists");
        }
    }
    let queued = state.scheduler.trigger_now(&id);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "watchlist_id": id, "queued": queued })),
    )
        .into_response()
}

pub async fn api_reload_watchlists(State(state): State<Arc<AppState>>) -> Response {
    match state.reload_watchlists().await {
        Ok(enabled) => Json(serde_json::json!({
            "enabled": enabled,
            "registered": state.scheduler.registered(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Watchlist reload failed");
            error(StatusCode::BAD_REQUEST, format!("Watchlist reload failed: {e}"))
        }
    }
}
