//! Health, status and trigger handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::scheduler::SchedulerStatus;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use teamrole_types::{TeamBinding, TeamSide};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
    })
}

/// Daemon status response
#[derive(Debug, Serialize)]
pub struct DaemonStatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub guild_id: String,
    pub teams: Vec<TeamBinding>,
    pub scheduler: SchedulerStatus,
}

/// Daemon status endpoint
pub async fn daemon_status(State(state): State<AppState>) -> Json<DaemonStatusResponse> {
    let reconciler = state.scheduler.reconciler();

    Json(DaemonStatusResponse {
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        started_at: state.started_at,
        guild_id: reconciler.guild_id().as_str().to_string(),
        teams: TeamSide::ALL
            .iter()
            .map(|side| reconciler.binding(*side).clone())
            .collect(),
        scheduler: state.scheduler.status(),
    })
}

/// Trigger response
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub queued: bool,
}

/// Queue an immediate reconciliation tick
pub async fn trigger_reconcile(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    if !state.scheduler.trigger_reconcile() {
        return Err(ApiError::Unavailable("scheduler is not running".to_string()));
    }

    tracing::info!("Reconciliation requested via API");
    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { queued: true })))
}
