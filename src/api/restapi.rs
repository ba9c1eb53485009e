//! Generic REST entry point
//!
//! `/restapi/{objectType}[/{arg1}[/{arg2}[/{arg3}]]]` for any method. The
//! admin login is resolved from the `x-login-token` header or the
//! `loginToken` query parameter before the request is offered to plugins.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use serde::Deserialize;

use super::{ApiState, status_response};
use crate::Error;
use crate::plugins::{DispatchOutcome, RestApiRequest};
use crate::status::Status;

/// Header carrying the login token
pub const LOGIN_TOKEN_HEADER: &str = "x-login-token";

/// Query parameter carrying the login token
pub const LOGIN_TOKEN_PARAM: &str = "loginToken";

#[derive(Debug, Deserialize)]
struct RestPath {
    object_type: String,
    #[serde(default)]
    arg1: String,
    #[serde(default)]
    arg2: String,
    #[serde(default)]
    arg3: String,
}

/// Build the generic REST router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/restapi/{object_type}", any(dispatch))
        .route("/restapi/{object_type}/{arg1}", any(dispatch))
        .route("/restapi/{object_type}/{arg1}/{arg2}", any(dispatch))
        .route("/restapi/{object_type}/{arg1}/{arg2}/{arg3}", any(dispatch))
        .with_state(state)
}

fn login_token<'a>(headers: &'a HeaderMap, query: &'a HashMap<String, String>) -> Option<&'a str> {
    headers
        .get(LOGIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| query.get(LOGIN_TOKEN_PARAM).map(String::as_str))
        .filter(|t| !t.is_empty())
}

async fn dispatch(
    State(state): State<Arc<ApiState>>,
    Path(path): Path<RestPath>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request = RestApiRequest::new(path.object_type, path.arg1, path.arg2, path.arg3);

    if let Some(token) = login_token(&headers, &query) {
        match state.logins.get_login(token).await {
            Ok(Some(login)) => request = request.with_login(login),
            Ok(None) => {
                tracing::debug!(object_type = %request.object_type, "unknown login token");
                return status_response(
                    StatusCode::UNAUTHORIZED,
                    Status::ExpiredLoginToken,
                    "invalid or expired login token",
                );
            }
            Err(e) => {
                tracing::error!(object_type = %request.object_type, error = %e, "login resolution failed");
                let message = match e {
                    Error::LoginResolution(_) => "login service unavailable",
                    _ => "login resolution failed",
                };
                return status_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    Status::DataCenterUnavailable,
                    message,
                );
            }
        }
    }

    request.method = method;
    request.headers = headers;
    request.query = query;
    request.body = body;

    match state.registry.dispatch_rest(&request).await {
        DispatchOutcome::Handled(response) => response.into_response(),
        DispatchOutcome::NotClaimed => status_response(
            StatusCode::NOT_FOUND,
            Status::InvalidResource,
            &format!("unsupported object type: {}", request.object_type),
        ),
        DispatchOutcome::Faulted { plugins } => {
            tracing::warn!(object_type = %request.object_type, faulted = ?plugins, "no plugin handled request");
            status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Status::Error,
                "request could not be handled",
            )
        }
        DispatchOutcome::Aborted { plugin } => {
            tracing::error!(plugin_id = %plugin, object_type = %request.object_type, "response aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONNECTION, HeaderValue::from_static("close"))],
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_prefers_header() {
        let mut headers = HeaderMap::new();
        let mut query = HashMap::new();
        assert_eq!(login_token(&headers, &query), None);

        query.insert(LOGIN_TOKEN_PARAM.to_string(), "from-query".to_string());
        assert_eq!(login_token(&headers, &query), Some("from-query"));

        headers.insert(LOGIN_TOKEN_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(login_token(&headers, &query), Some("from-header"));

        query.insert(LOGIN_TOKEN_PARAM.to_string(), String::new());
        headers.clear();
        assert_eq!(login_token(&headers, &query), None);
    }
}
