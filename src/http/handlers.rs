//! Operator endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::{ApiResult, AppState, failure, success};
use crate::model::LeadStatus;

/// Leads listed in the `/queue` overview.
const RECENT_LEADS: i64 = 20;

/// GET /queue
pub async fn queue_overview(State(state): State<AppState>) -> ApiResult {
    let queue = state.worker.pipeline().queue();
    let stats = queue.stats().await?;
    let recent = queue.list_recent(RECENT_LEADS).await?;
    Ok(success(json!({ "stats": stats, "recent": recent })))
}

/// GET /queue/pending
pub async fn pending_leads(State(state): State<AppState>) -> ApiResult {
    let leads = state
        .worker
        .pipeline()
        .queue()
        .list_by_status(LeadStatus::Pending, None)
        .await?;
    Ok(success(leads))
}

/// GET /queue/failed
pub async fn failed_leads(State(state): State<AppState>) -> ApiResult {
    let leads = state.worker.pipeline().queue().list_failed().await?;
    Ok(success(leads))
}

/// POST /queue/retry-all
pub async fn retry_all(State(state): State<AppState>) -> ApiResult {
    let reset = state.worker.retry_failed().await?;
    Ok(success(json!({ "reset": reset.len(), "leads": reset })))
}

/// POST /queue/retry/{external_id}
pub async fn retry_one(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult {
    let lead = state.worker.retry_one(&external_id).await?;
    Ok(success(lead))
}

/// POST /queue/add/{external_id}
pub async fn add_lead(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult {
    let result = state
        .worker
        .pipeline()
        .queue()
        .enqueue(&external_id, None)
        .await?;
    let created = result.is_created();
    Ok(success(json!({ "created": created, "lead": result.into_lead() })))
}

/// GET /sync/status
pub async fn sync_status(State(state): State<AppState>) -> ApiResult {
    let status = state.reconciler.status().await?;
    Ok(success(status))
}

/// POST /sync
pub async fn run_sync(State(state): State<AppState>) -> ApiResult {
    let report = state.reconciler.run().await?;
    Ok(success(report))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> ApiResult {
    let pipeline = state.worker.pipeline();
    let queue = pipeline.queue().stats().await?;
    let assignments = pipeline.ledger().stats().await?;
    Ok(success(json!({
        "queue": queue,
        "assignments": assignments,
        "worker": state.worker.status(),
    })))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Response {
    let uptime_secs = state.started_at.elapsed().as_secs();
    match state.worker.pipeline().queue().health_check().await {
        Ok(_) => success(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": uptime_secs,
            "worker": state.worker.status(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("health check failed: {e}");
            failure(StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}
