//! Plugin administration endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{ApiState, status_response};
use crate::Error;
use crate::plugins::{
    ConflictRecord, MountInfo, PluginInfo, PluginSessionType, PluginState, RouteInfo,
};
use crate::status::Status;

/// Full view of one plugin
#[derive(Serialize)]
pub struct PluginDetail {
    #[serde(flatten)]
    pub info: PluginInfo,
    /// Redacted configuration, present while active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    pub routes: Vec<RouteInfo>,
    pub mounts: Vec<MountInfo>,
}

/// Build plugin administration routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/plugins", get(list_plugins))
        .route("/plugins/conflicts", get(list_conflicts))
        .route("/plugins/{id}", get(get_plugin).delete(unregister_plugin))
        .route("/session-types", get(list_session_types))
        .with_state(state)
}

/// List all registered plugins
async fn list_plugins(State(state): State<Arc<ApiState>>) -> Json<Vec<PluginInfo>> {
    Json(state.registry.list().await)
}

/// Routes and mounts rejected at merge time
async fn list_conflicts(State(state): State<Arc<ApiState>>) -> Json<Vec<ConflictRecord>> {
    Json(state.registry.conflicts().await)
}

/// Session types offered by active plugins
async fn list_session_types(State(state): State<Arc<ApiState>>) -> Json<Vec<PluginSessionType>> {
    Json(state.registry.session_types().await)
}

/// Get one plugin with its redacted configuration
async fn get_plugin(State(state): State<Arc<ApiState>>, Path(id): Path<String>) -> Response {
    let Some(info) = state.registry.info(&id).await else {
        return not_found(&id);
    };

    let config = if info.state == PluginState::Active {
        state.registry.active_config(&id).await.ok()
    } else {
        None
    };
    let routes = state
        .registry
        .routes()
        .await
        .into_iter()
        .filter(|r| r.owner == id)
        .collect();
    let mounts = state
        .registry
        .mounts()
        .await
        .into_iter()
        .filter(|m| m.owner == id)
        .collect();

    Json(PluginDetail {
        info,
        config,
        routes,
        mounts,
    })
    .into_response()
}

/// Unregister a plugin
async fn unregister_plugin(State(state): State<Arc<ApiState>>, Path(id): Path<String>) -> Response {
    match state.registry.unregister(&id).await {
        Ok(()) => {
            tracing::info!(plugin_id = %id, "plugin unregistered via API");
            status_response(StatusCode::OK, Status::Ok, "plugin unregistered")
        }
        Err(Error::PluginNotFound(_)) => not_found(&id),
        Err(e) => {
            tracing::error!(plugin_id = %id, error = %e, "failed to unregister plugin");
            status_response(StatusCode::INTERNAL_SERVER_ERROR, Status::Error, "failed to unregister plugin")
        }
    }
}

fn not_found(id: &str) -> Response {
    tracing::debug!(plugin_id = %id, "plugin not found");
    status_response(StatusCode::NOT_FOUND, Status::InvalidResource, "plugin not found")
}
