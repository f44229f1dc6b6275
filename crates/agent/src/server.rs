// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health and metrics HTTP surface.

use crate::metrics::AgentMetrics;
use crate::worker::WorkerSnapshot;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What the server reads from the pool.
pub trait StatusSource: Send + Sync {
    fn snapshots(&self) -> Vec<WorkerSnapshot>;
    fn heartbeat_healthy(&self) -> bool;
}

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn StatusSource>,
    pub metrics: AgentMetrics,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/status.json", get(status))
        .route("/metrics", get(metrics))
        .route("/agent/:spawn_index", get(agent))
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    let count = state.source.snapshots().len();
    if state.source.heartbeat_healthy() {
        (StatusCode::OK, format!("OK: {} workers running", count))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "heartbeat failing".to_string())
    }
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let workers = state.source.snapshots();
    let aggregate = if workers.iter().any(|w| w.status == "busy") { "busy" } else { "idle" };
    let health = if state.source.heartbeat_healthy() { "ok" } else { "degraded" };
    Json(serde_json::json!({
        "health": health,
        "aggregate_status": aggregate,
        "workers": workers,
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

async fn agent(
    State(state): State<AppState>,
    Path(spawn_index): Path<usize>,
) -> impl IntoResponse {
    match state.source.snapshots().into_iter().find(|w| w.spawn_index == spawn_index) {
        Some(snapshot) => (StatusCode::OK, Json(serde_json::json!(snapshot))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no such worker" })),
        ),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
