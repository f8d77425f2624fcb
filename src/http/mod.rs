//! HTTP surface: lead-gen webhook plus operator endpoints.

pub mod auth;
pub mod handlers;
pub mod webhook;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::engine::{QueueWorker, SyncReconciler};
use crate::error::Error;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub worker: QueueWorker,
    pub reconciler: Arc<SyncReconciler>,
    pub auth: auth::AuthConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        worker: QueueWorker,
        reconciler: SyncReconciler,
        verify_token: SecretString,
        operator_api_key: Option<SecretString>,
    ) -> Self {
        Self {
            worker,
            reconciler: Arc::new(reconciler),
            auth: auth::AuthConfig {
                verify_token: Arc::new(verify_token),
                operator_api_key: operator_api_key.map(Arc::new),
            },
            started_at: Instant::now(),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route("/queue/retry-all", post(handlers::retry_all))
        .route("/queue/retry/{external_id}", post(handlers::retry_one))
        .route("/queue/add/{external_id}", post(handlers::add_lead))
        .route("/sync", post(handlers::run_sync))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_operator_key,
        ));

    Router::new()
        .route(
            "/webhook",
            get(webhook::verify_subscription).post(webhook::receive),
        )
        .route("/queue", get(handlers::queue_overview))
        .route("/queue/pending", get(handlers::pending_leads))
        .route("/queue/failed", get(handlers::failed_leads))
        .route("/sync/status", get(handlers::sync_status))
        .route("/stats", get(handlers::stats))
        .route("/health", get(handlers::health))
        .merge(operator_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> crate::error::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// `{"success": true, "data": ...}`
pub fn success<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

/// `{"success": false, "error": ...}` with an explicit status.
pub fn failure(status: StatusCode, reason: &str) -> Response {
    (status, Json(json!({ "success": false, "error": reason }))).into_response()
}

/// Error body `{"success": false, "error": ...}` with a status derived from the error.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Fetch(_) | Error::Notify(_) | Error::Record(_) | Error::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, "request failed: {}", self.0);
        }
        failure(status, &self.0.to_string())
    }
}

pub type ApiResult = std::result::Result<Json<serde_json::Value>, ApiError>;
