//! HTTP API server
//!
//! Serves the generic REST entry point, admin endpoints, health probes, and
//! everything plugins contributed (routes and static mounts) through a
//! registry-backed fallback.

mod auth;
pub mod health;
pub mod host_routes;
pub mod plugins;
pub mod restapi;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::login::LoginGateway;
use crate::plugins::PluginRegistry;
use crate::status::Status;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct ApiState {
    pub registry: PluginRegistry,
    pub logins: LoginGateway,
    /// Bearer key for admin endpoints; unauthenticated when `None`
    pub api_key: Option<String>,
    /// Served after plugin routes and mounts
    pub static_dir: Option<PathBuf>,
}

/// `{status, message}` body with the given HTTP status
pub(crate) fn status_response(http: StatusCode, status: Status, message: &str) -> Response {
    (
        http,
        Json(json!({ "status": status.code(), "message": message })),
    )
        .into_response()
}

pub struct ApiServerBuilder {
    registry: PluginRegistry,
    logins: LoginGateway,
    api_key: Option<String>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServerBuilder {
    #[must_use]
    pub const fn new(registry: PluginRegistry, logins: LoginGateway, port: u16) -> Self {
        Self {
            registry,
            logins,
            api_key: None,
            port,
            static_dir: None,
        }
    }

    #[must_use]
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            state: Arc::new(ApiState {
                registry: self.registry,
                logins: self.logins,
                api_key: self.api_key,
                static_dir: self.static_dir,
            }),
            port: self.port,
        }
    }
}

pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Build the router with all routes
    pub fn router(&self) -> Router {
        if let Some(dir) = &self.state.static_dir {
            tracing::info!(path = %dir.display(), "serving static files");
        }

        let admin = plugins::router(self.state.clone()).route_layer(
            axum::middleware::from_fn_with_state(self.state.clone(), auth::require_api_key),
        );

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .nest("/api", admin)
            .merge(restapi::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()))
            .merge(host_routes::router(self.state.clone()))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }
}
