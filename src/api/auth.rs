//! API key authentication middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use super::{ApiState, status_response};
use crate::status::Status;

/// Extract API key from Authorization header
fn extract_api_key(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Middleware to verify API key
pub async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Response {
    // If no API key configured, allow all requests (development mode)
    let Some(expected_key) = &state.api_key else {
        tracing::warn!("API key not configured - allowing unauthenticated access");
        return next.run(req).await;
    };

    match extract_api_key(&req) {
        Some(key) if key == expected_key => next.run(req).await,
        Some(_) => {
            tracing::warn!("invalid API key provided");
            status_response(StatusCode::UNAUTHORIZED, Status::InvalidCredentials, "invalid API key")
        }
        None => {
            tracing::debug!("no API key provided");
            status_response(StatusCode::UNAUTHORIZED, Status::InvalidCredentials, "API key required")
        }
    }
}
