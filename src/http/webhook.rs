//! Lead-gen webhook: subscription handshake and change notifications.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::AppState;
use crate::config::secrets::matches_secret;

#[derive(Debug, Deserialize)]
pub struct SubscriptionQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook: echo the challenge when the verify token matches.
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> Response {
    let token_ok = query
        .verify_token
        .as_deref()
        .is_some_and(|t| matches_secret(&state.auth.verify_token, t));

    if query.mode.as_deref() == Some("subscribe") && token_ok {
        info!("webhook subscription verified");
        (StatusCode::OK, query.challenge.unwrap_or_default()).into_response()
    } else {
        warn!(mode = ?query.mode, "webhook verification failed");
        StatusCode::FORBIDDEN.into_response()
    }
}

/// POST /webhook: acknowledge at once, enqueue in the background.
///
/// Always answers 200 so the platform does not redeliver; parse and storage
/// failures are only logged.
pub async fn receive(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("webhook body is not JSON: {e}");
            return StatusCode::OK;
        }
    };

    let lead_ids = leadgen_ids(&payload);
    if lead_ids.is_empty() {
        info!("webhook carried no leadgen changes");
        return StatusCode::OK;
    }

    let queue = state.worker.pipeline().queue().clone();
    tokio::spawn(async move {
        for id in lead_ids {
            info!(external_id = %id, "lead announced by webhook");
            if let Err(e) = queue.enqueue(&id, Some(payload.clone())).await {
                warn!(external_id = %id, "enqueue from webhook failed: {e}");
            }
        }
    });

    StatusCode::OK
}

/// Every `leadgen_id` under `entry[].changes[]` whose field is `leadgen`.
pub fn leadgen_ids(payload: &Value) -> Vec<String> {
    let entries = payload
        .get("entry")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    entries
        .iter()
        .filter_map(|entry| entry.get("changes").and_then(Value::as_array))
        .flatten()
        .filter(|change| change.get("field").and_then(Value::as_str) == Some("leadgen"))
        .filter_map(|change| match change.get("value")?.get("leadgen_id")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        })
        .collect()
}
