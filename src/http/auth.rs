//! Operator authentication.
//!
//! Mutating operator routes require `x-api-key` when an operator key is
//! configured. Without one the routes are open.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use secrecy::SecretString;

use super::failure;
use crate::config::secrets::matches_secret;

#[derive(Clone)]
pub struct AuthConfig {
    /// Token the lead-gen platform echoes during subscription verification.
    pub verify_token: Arc<SecretString>,
    pub operator_api_key: Option<Arc<SecretString>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("verify_token", &"[redacted]")
            .field("operator_api_key", &self.operator_api_key.is_some())
            .finish()
    }
}

pub async fn require_operator_key(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &auth.operator_api_key else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if matches_secret(expected, key) => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "operator request rejected");
            failure(StatusCode::UNAUTHORIZED, "missing or invalid x-api-key")
        }
    }
}
