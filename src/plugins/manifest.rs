//! Contributions a plugin declares when it becomes active

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::Method;
use axum::response::Response;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Handler mounted on the public router
pub type RouteHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Handler fanned out to by [`PluginRegistry::route`](super::PluginRegistry::route)
pub type TriggerHandler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Serve files under `static_folder` at URL prefix `path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticFolder {
    pub static_folder: PathBuf,
    pub path: String,
}

impl StaticFolder {
    #[must_use]
    pub fn new(static_folder: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        Self {
            static_folder: static_folder.into(),
            path: path.into(),
        }
    }
}

/// Public route contributed by a plugin
///
/// `path` may contain `{name}` segments; captured values reach the handler
/// as a [`RouteParams`](super::RouteParams) request extension.
#[derive(Clone)]
pub struct PublicHandler {
    pub method: Method,
    pub path: String,
    pub handler: RouteHandler,
}

impl PublicHandler {
    pub fn new<F, Fut>(method: Method, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            method,
            path: path.into(),
            handler: Arc::new(move |req| Box::pin(handler(req))),
        }
    }
}

impl std::fmt::Debug for PublicHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicHandler")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Event hook keyed by `(object_type, action)`
#[derive(Clone)]
pub struct Trigger {
    pub object_type: String,
    pub action: String,
    pub handler: TriggerHandler,
}

impl Trigger {
    pub fn new<F, Fut>(object_type: impl Into<String>, action: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            object_type: object_type.into(),
            action: action.into(),
            handler: Arc::new(move |params| Box::pin(handler(params))),
        }
    }

    #[must_use]
    pub fn matches(&self, object_type: &str, action: &str) -> bool {
        self.object_type == object_type && self.action == action
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("object_type", &self.object_type)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

/// Session kind offered to the session picker
///
/// Informational only; it does not influence dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionType {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl SessionType {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Everything a plugin contributes from `init`
#[derive(Debug, Clone, Default)]
pub struct PluginInitResponse {
    pub static_folders: Vec<StaticFolder>,
    pub public_server_handlers: Vec<PublicHandler>,
    pub triggers: Vec<Trigger>,
    pub session_types: Vec<SessionType>,
}

impl PluginInitResponse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn static_folder(mut self, folder: StaticFolder) -> Self {
        self.static_folders.push(folder);
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: PublicHandler) -> Self {
        self.public_server_handlers.push(handler);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    #[must_use]
    pub fn session_type(mut self, session_type: SessionType) -> Self {
        self.session_types.push(session_type);
        self
    }
}
