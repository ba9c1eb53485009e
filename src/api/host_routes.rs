//! Plugin routes and static mounts
//!
//! Installed as the router fallback and resolved against the registry on
//! every request, so unregistering a plugin withdraws its routes at once.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use super::{ApiState, status_response};
use crate::plugins::{MountMatch, RouteMatch, panic_message};
use crate::status::Status;

/// Build the fallback router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().fallback(serve).with_state(state)
}

async fn serve(State(state): State<Arc<ApiState>>, req: Request) -> Response {
    let path = req.uri().path().to_string();

    if let Some(route) = state.registry.match_route(req.method(), &path).await {
        return call_route(route, req).await;
    }

    let is_read = req.method() == Method::GET || req.method() == Method::HEAD;
    if is_read {
        if let Some(mount) = state.registry.match_static(&path).await {
            return serve_mount(mount, req).await;
        }
        if let Some(dir) = &state.static_dir {
            let index = dir.join("index.html");
            let service = ServeDir::new(dir).not_found_service(ServeFile::new(index));
            return match service.oneshot(req).await {
                Ok(res) => res.into_response(),
                Err(never) => match never {},
            };
        }
    }

    status_response(StatusCode::NOT_FOUND, Status::InvalidResource, "not found")
}

async fn call_route(route: RouteMatch, mut req: Request) -> Response {
    req.extensions_mut().insert(route.params);
    let handler = route.handler;

    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(req))) {
        Ok(fut) => AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .map_err(panic_message),
        Err(payload) => Err(panic_message(payload)),
    };

    outcome.unwrap_or_else(|message| {
        tracing::error!(plugin_id = %route.owner, error = %message, "route handler panicked");
        status_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            Status::Error,
            "request could not be handled",
        )
    })
}

async fn serve_mount(mount: MountMatch, mut req: Request) -> Response {
    let target = match req.uri().query() {
        Some(query) => format!("{}?{query}", mount.rest),
        None => mount.rest.clone(),
    };
    let Ok(uri) = target.parse::<Uri>() else {
        return status_response(StatusCode::BAD_REQUEST, Status::Error, "invalid path");
    };
    *req.uri_mut() = uri;

    tracing::trace!(plugin_id = %mount.owner, path = %mount.rest, "serving static file");
    match ServeDir::new(&mount.folder).oneshot(req).await {
        Ok(res) => res.into_response(),
        Err(never) => match never {},
    }
}
