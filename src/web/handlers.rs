//! HTTP request handlers.

use super::AppState;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

// ============================================================================
// Health
// ============================================================================

pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let monitors = state.manager.get_all().await.len();
    Json(json!({ "status": "ok", "monitors": monitors }))
}

// ============================================================================
// API: Monitors
// ============================================================================

pub async fn handle_get_monitors(State(state): State<AppState>) -> impl IntoResponse {
    let snapshots: Vec<_> = state
        .manager
        .get_all()
        .await
        .iter()
        .map(|m| m.snapshot())
        .collect();
    Json(snapshots)
}

pub async fn handle_get_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.manager.get_monitor(&id).await {
        Some(monitor) => Json(monitor.snapshot()).into_response(),
        None => (StatusCode::NOT_FOUND, "Monitor not found").into_response(),
    }
}

/// Re-read monitor configuration after it was changed elsewhere.
pub async fn handle_sync(State(state): State<AppState>) -> impl IntoResponse {
    state.manager.sync().await;
    StatusCode::NO_CONTENT
}

// ============================================================================
// API: Settings
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct LatencyThreshold {
    pub threshold: i64,
}

pub async fn handle_get_latency_threshold(State(state): State<AppState>) -> impl IntoResponse {
    Json(LatencyThreshold {
        threshold: state.manager.get_latency_threshold().await,
    })
}

pub async fn handle_set_latency_threshold(
    State(state): State<AppState>,
    Json(req): Json<LatencyThreshold>,
) -> impl IntoResponse {
    if req.threshold <= 0 {
        return (StatusCode::BAD_REQUEST, "threshold must be positive").into_response();
    }

    if let Err(e) = state
        .manager
        .store()
        .set_setting("latency_threshold", &req.threshold.to_string())
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    state.manager.set_latency_threshold(req.threshold).await;
    Json(req).into_response()
}

// ============================================================================
// API: Maintenance
// ============================================================================

pub async fn handle_group_maintenance(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> impl IntoResponse {
    let in_maintenance = state.manager.is_group_in_maintenance(&group_id).await;
    Json(json!({ "group_id": group_id, "in_maintenance": in_maintenance }))
}
