use std::sync::Arc;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dealscout_common::Config;
use dealscout_scout::services::Services;

mod rest;
mod sse;

pub type AppState = Services;

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Discovery runs
        .route("/api/runs", post(rest::api_start_run))
        .route("/api/runs/sync", post(rest::api_run_sync))
        .route("/api/runs/{id}", get(rest::api_run_detail))
        .route("/api/runs/{id}/result", get(rest::api_run_result))
        .route("/api/runs/{id}/events", get(sse::run_events))
        .route("/api/runs/{id}/cancel", post(rest::api_cancel_run))
        // Watchlists
        .route("/api/alerts/stream", get(sse::alert_stream))
        .route("/api/watchlists/reload", post(rest::api_reload_watchlists))
        .route("/api/watchlists/{id}/trigger", post(rest::api_trigger_watchlist))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dealscout=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let state = Arc::new(Services::from_config(&config));
    let consumer = state.start_watching().await?;

    let app = build_router(state.clone());
    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("DealScout API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    info!("Shutting down");
    state.scheduler.shutdown();
    if let Some(consumer) = consumer {
        consumer.abort();
    }
    Ok(())
}
