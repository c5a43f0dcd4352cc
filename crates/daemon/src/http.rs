//! axum server for the control endpoint and the statistics views.
//!
//! `POST /ng` takes a control request, `GET /statistics` returns the exported
//! document as JSON, `GET /metrics` the text exposition and `GET /totals` the
//! operator text view.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_stats::export::render_text;
use relay_stats::{Dict, Timestamp};
use tokio::net::TcpListener;

use crate::Daemon;
use crate::control::ControlHandler;
use crate::exposition;

#[derive(Clone)]
struct AppState {
    daemon: Arc<Daemon>,
    control: ControlHandler,
}

pub fn router(daemon: Arc<Daemon>) -> Router {
    let state = AppState {
        control: ControlHandler::new(Arc::clone(&daemon)),
        daemon,
    };
    Router::new()
        .route("/ng", post(control))
        .route("/statistics", get(statistics))
        .route("/metrics", get(metrics))
        .route("/totals", get(totals))
        .with_state(state)
}

/// Bind `addr` and serve until the future is dropped.
pub async fn serve(daemon: Arc<Daemon>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("Control and metrics listening on http://{}", addr);

    axum::serve(
        listener,
        router(daemon).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server error")
}

async fn control(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(request): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    Json(state.control.handle(peer, &request))
}

async fn statistics(State(state): State<AppState>) -> Response {
    let daemon = &state.daemon;
    let mut root = Dict::new();
    match daemon.stats.export_into(&mut root, daemon.as_ref(), Timestamp::now()) {
        Ok(()) => Json(root).into_response(),
        Err(e) => {
            tracing::error!("Statistics export failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let seq = state.daemon.stats.gather_metrics(state.daemon.as_ref(), Timestamp::now());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        exposition::render(&seq),
    )
}

async fn totals(State(state): State<AppState>) -> String {
    let seq = state.daemon.stats.gather_metrics(state.daemon.as_ref(), Timestamp::now());
    render_text(&seq)
}
