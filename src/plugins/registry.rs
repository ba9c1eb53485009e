//! Plugin registry
//!
//! Owns every loaded plugin, its lifecycle state and its contributions.
//! Mutations (`register`, `unregister`) are serialized by a dedicated lock
//! and take the table lock exclusively only while editing shared tables.
//! Lookups (`dispatch_rest`, `route`, messaging) take the table lock shared,
//! snapshot what they need and release it before calling into plugin code,
//! so handlers may message other plugins without deadlocking.

use std::sync::Arc;

use axum::http::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};

use super::contract::{Capabilities, Plugin, PluginMessage};
use super::core_module::{CoreModule, HostServices, PluginIdentity};
use super::guard::{guard_async, guard_sync};
use super::manifest::{PluginInitResponse, SessionType, Trigger};
use super::rest::{RestApiRequest, RestResponse};
use super::routes::{MountInfo, MountMatch, RouteInfo, RouteMatch, RouteTable};
use super::schema::PluginConfig;
use crate::{Error, Result};

/// Lifecycle state of a registered plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Unregistered,
    Initializing,
    Active,
    Deinitializing,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unregistered => "unregistered",
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Deinitializing => "deinitializing",
        };
        f.write_str(s)
    }
}

/// Successful registration
#[derive(Debug)]
pub struct Registration {
    pub identity: PluginIdentity,
    /// Contributions that were dropped because another owner holds them
    pub conflicts: Vec<Error>,
}

/// Result of generic REST dispatch
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A plugin claimed the request
    Handled(RestResponse),
    /// No active plugin claimed the object type
    NotClaimed,
    /// Nobody claimed the request and these plugins faulted while trying
    Faulted { plugins: Vec<String> },
    /// A plugin faulted after committing its response
    Aborted { plugin: String },
}

impl DispatchOutcome {
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

/// A route or mount that lost to an earlier owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub method: String,
    pub path: String,
    pub owner: String,
    pub contender: String,
}

/// Summary of a registered plugin
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub state: PluginState,
    pub capabilities: Capabilities,
    pub routes: usize,
    pub triggers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Session type tagged with the plugin that offers it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSessionType {
    pub plugin: String,
    #[serde(flatten)]
    pub session_type: SessionType,
}

struct PluginEntry {
    identity: PluginIdentity,
    plugin: Arc<dyn Plugin>,
    capabilities: Capabilities,
    state: PluginState,
    config: Option<PluginConfig>,
    triggers: Vec<Trigger>,
    session_types: Vec<SessionType>,
    last_error: Option<String>,
}

impl PluginEntry {
    fn info(&self, routes: &[RouteInfo]) -> PluginInfo {
        PluginInfo {
            id: self.identity.id.clone(),
            name: self.identity.name.clone(),
            version: self.identity.version.clone(),
            state: self.state,
            capabilities: self.capabilities,
            routes: routes
                .iter()
                .filter(|r| r.owner == self.identity.id)
                .count(),
            triggers: self.triggers.len(),
            last_error: self.last_error.clone(),
        }
    }

    fn reset(&mut self) {
        self.state = PluginState::Unregistered;
        self.config = None;
        self.triggers.clear();
        self.session_types.clear();
    }
}

#[derive(Default)]
struct Tables {
    entries: Vec<PluginEntry>,
    routes: RouteTable,
    conflicts: Vec<ConflictRecord>,
}

impl Tables {
    fn entry(&self, id: &str) -> Option<&PluginEntry> {
        self.entries.iter().find(|e| e.identity.id == id)
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut PluginEntry> {
        self.entries.iter_mut().find(|e| e.identity.id == id)
    }

    /// Unregistered slot left behind by an earlier plugin called `name`
    fn reusable_mut(&mut self, name: &str) -> Option<&mut PluginEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.identity.name == name && e.state == PluginState::Unregistered)
    }

    /// Drop conflict records that involve `id`
    fn prune_conflicts(&mut self, id: &str) {
        self.conflicts
            .retain(|c| c.owner != id && c.contender != id);
    }

    /// Slug of `name`, suffixed until unique
    fn assign_id(&self, name: &str) -> String {
        let base = slugify(name);
        let mut id = base.clone();
        let mut n = 2;
        while self.entry(&id).is_some() {
            id = format!("{base}-{n}");
            n += 1;
        }
        id
    }

    fn active(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries
            .iter()
            .filter(|e| e.state == PluginState::Active)
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("plugin");
    }
    slug
}

fn resolve_config(
    id: &str,
    plugin: &dyn Plugin,
    capabilities: Capabilities,
    supplied: &Map<String, Value>,
) -> Result<PluginConfig> {
    if !capabilities.conf_descriptions {
        return Ok(PluginConfig::unvalidated(supplied.clone()));
    }
    let descriptions =
        guard_sync(|| Ok(plugin.conf_descriptions())).map_err(|message| {
            Error::PluginInit {
                plugin: id.to_string(),
                message,
            }
        })?;
    PluginConfig::validate_and_merge(id, &descriptions, supplied)
}

/// State shared with every `CoreModule` through a weak handle
pub(crate) struct Shared {
    services: HostServices,
    tables: RwLock<Tables>,
    mutation: Mutex<()>,
}

impl Shared {
    pub(crate) async fn send_message(&self, from: &str, to: &str, body: Value) -> Result<Value> {
        let plugin = {
            let tables = self.tables.read().await;
            let entry = tables
                .entry(to)
                .ok_or_else(|| Error::PluginNotFound(to.to_string()))?;
            if entry.state != PluginState::Active {
                return Err(Error::PluginNotActive(to.to_string()));
            }
            if !entry.capabilities.handle_message {
                return Err(Error::PluginRequest {
                    plugin: to.to_string(),
                    message: "plugin does not handle messages".to_string(),
                });
            }
            Arc::clone(&entry.plugin)
        };

        let message = PluginMessage {
            from: from.to_string(),
            body,
        };
        let timeout = self.services.message_timeout;
        match tokio::time::timeout(timeout, guard_async(plugin.handle_message(message))).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(message)) => {
                tracing::warn!(from = %from, plugin_id = %to, error = %message, "message handler faulted");
                Err(Error::PluginRequest {
                    plugin: to.to_string(),
                    message,
                })
            }
            Err(_) => {
                tracing::warn!(from = %from, plugin_id = %to, timeout_ms = timeout.as_millis(), "message timed out");
                Err(Error::MessageTimeout {
                    plugin: to.to_string(),
                })
            }
        }
    }
}

/// Registry of hosted plugins
#[derive(Clone)]
pub struct PluginRegistry {
    shared: Arc<Shared>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new(services: HostServices) -> Self {
        Self {
            shared: Arc::new(Shared {
                services,
                tables: RwLock::new(Tables::default()),
                mutation: Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn services(&self) -> &HostServices {
        &self.shared.services
    }

    /// Validate config, initialize the plugin and merge its contributions
    ///
    /// A plugin whose config is invalid or whose `init` faults keeps an
    /// entry in state [`PluginState::Unregistered`] with the failure
    /// recorded. Route conflicts do not fail registration; the conflicting
    /// contribution is dropped and reported in [`Registration::conflicts`].
    /// A plugin registered again under a name whose entry is unregistered
    /// takes that entry back, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] or [`Error::PluginInit`]
    pub async fn register(
        &self,
        plugin: Arc<dyn Plugin>,
        config: Map<String, Value>,
    ) -> Result<Registration> {
        let _mutation = self.shared.mutation.lock().await;

        let capabilities = plugin.capabilities();
        let identity = {
            let mut tables = self.shared.tables.write().await;
            if let Some(entry) = tables.reusable_mut(plugin.name()) {
                // Re-registration keeps the id and the dispatch position
                entry.identity.version = plugin.version().to_string();
                entry.plugin = Arc::clone(&plugin);
                entry.capabilities = capabilities;
                entry.state = PluginState::Initializing;
                entry.last_error = None;
                entry.identity.clone()
            } else {
                let identity = PluginIdentity {
                    id: tables.assign_id(plugin.name()),
                    name: plugin.name().to_string(),
                    version: plugin.version().to_string(),
                };
                tables.entries.push(PluginEntry {
                    identity: identity.clone(),
                    plugin: Arc::clone(&plugin),
                    capabilities,
                    state: PluginState::Initializing,
                    config: None,
                    triggers: Vec::new(),
                    session_types: Vec::new(),
                    last_error: None,
                });
                identity
            }
        };
        let id = identity.id.clone();

        tracing::debug!(plugin_id = %id, name = %identity.name, version = %identity.version, "initializing plugin");

        let config = match resolve_config(&id, plugin.as_ref(), capabilities, &config) {
            Ok(config) => config,
            Err(e) => {
                self.fail(&id, &e).await;
                return Err(e);
            }
        };

        let core = CoreModule::new(
            identity.clone(),
            &self.shared.services,
            Arc::downgrade(&self.shared),
        );
        let manifest = match guard_sync(|| plugin.init(core, &config)) {
            Ok(manifest) => manifest,
            Err(message) => {
                let e = Error::PluginInit {
                    plugin: id.clone(),
                    message,
                };
                self.fail(&id, &e).await;
                return Err(e);
            }
        };

        let conflicts = self.merge(&id, manifest, config).await;

        tracing::info!(
            plugin_id = %id,
            name = %identity.name,
            version = %identity.version,
            conflicts = conflicts.len(),
            "plugin registered"
        );

        Ok(Registration {
            identity,
            conflicts,
        })
    }

    async fn fail(&self, id: &str, error: &Error) {
        tracing::error!(plugin_id = %id, error = %error, "plugin registration failed");
        let mut tables = self.shared.tables.write().await;
        if let Some(entry) = tables.entry_mut(id) {
            entry.reset();
            entry.last_error = Some(error.to_string());
        }
    }

    async fn merge(
        &self,
        id: &str,
        manifest: PluginInitResponse,
        config: PluginConfig,
    ) -> Vec<Error> {
        let mut tables = self.shared.tables.write().await;
        let mut conflicts = Vec::new();

        let mut results = Vec::new();
        for handler in &manifest.public_server_handlers {
            results.push(tables.routes.insert_route(id, handler));
        }
        for folder in &manifest.static_folders {
            results.push(tables.routes.insert_mount(id, folder));
        }

        for result in results {
            let Err(e) = result else { continue };
            if let Error::RouteConflict {
                method,
                path,
                owner,
                contender,
            } = &e
            {
                tracing::warn!(
                    plugin_id = %id,
                    method = %method,
                    path = %path,
                    owner = %owner,
                    "route conflict, contribution dropped"
                );
                tables.conflicts.push(ConflictRecord {
                    method: method.clone(),
                    path: path.clone(),
                    owner: owner.clone(),
                    contender: contender.clone(),
                });
            }
            conflicts.push(e);
        }

        if let Some(entry) = tables.entry_mut(id) {
            entry.triggers = manifest.triggers;
            entry.session_types = manifest.session_types;
            entry.config = Some(config);
            entry.last_error = None;
            entry.state = PluginState::Active;
        }

        conflicts
    }

    /// Deactivate a plugin and withdraw its contributions
    ///
    /// Calling this on a plugin that is not active is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PluginNotFound`] if no plugin has this id
    pub async fn unregister(&self, id: &str) -> Result<()> {
        let _mutation = self.shared.mutation.lock().await;

        let (plugin, capabilities) = {
            let mut tables = self.shared.tables.write().await;
            let entry = tables
                .entry_mut(id)
                .ok_or_else(|| Error::PluginNotFound(id.to_string()))?;
            if entry.state != PluginState::Active {
                tracing::debug!(plugin_id = %id, state = %entry.state, "unregister skipped, plugin not active");
                return Ok(());
            }
            entry.state = PluginState::Deinitializing;
            entry.triggers.clear();
            entry.session_types.clear();
            let handle = (Arc::clone(&entry.plugin), entry.capabilities);
            let removed = tables.routes.remove_owner(id);
            tables.prune_conflicts(id);
            tracing::debug!(plugin_id = %id, removed, "contributions withdrawn");
            handle
        };

        if capabilities.deinit {
            if let Err(message) = guard_sync(|| plugin.deinit()) {
                tracing::error!(plugin_id = %id, error = %message, "plugin deinit faulted");
            }
        }

        let mut tables = self.shared.tables.write().await;
        if let Some(entry) = tables.entry_mut(id) {
            entry.reset();
        }
        tracing::info!(plugin_id = %id, "plugin unregistered");
        Ok(())
    }

    /// Unregister every plugin, most recently registered first
    pub async fn unregister_all(&self) {
        let ids: Vec<String> = {
            let tables = self.shared.tables.read().await;
            tables
                .active()
                .map(|e| e.identity.id.clone())
                .collect()
        };
        for id in ids.iter().rev() {
            if let Err(e) = self.unregister(id).await {
                tracing::warn!(plugin_id = %id, error = %e, "failed to unregister plugin");
            }
        }
    }

    /// Offer a generic REST request to active plugins in registration order
    ///
    /// The first plugin returning `true` wins. Faulting plugins are logged
    /// and skipped unless they had already committed their response.
    pub async fn dispatch_rest(&self, request: &RestApiRequest) -> DispatchOutcome {
        let candidates: Vec<(String, Arc<dyn Plugin>)> = {
            let tables = self.shared.tables.read().await;
            tables
                .active()
                .filter(|e| e.capabilities.rest_api)
                .map(|e| (e.identity.id.clone(), Arc::clone(&e.plugin)))
                .collect()
        };

        let mut faulted = Vec::new();
        for (id, plugin) in candidates {
            let mut response = RestResponse::new();
            let result = guard_async(plugin.handle_rest_api_request(request, &mut response)).await;
            match result {
                Ok(true) => {
                    tracing::debug!(plugin_id = %id, object_type = %request.object_type, "rest request handled");
                    return DispatchOutcome::Handled(response);
                }
                Ok(false) if response.is_committed() => {
                    tracing::warn!(plugin_id = %id, object_type = %request.object_type, "plugin wrote a response without claiming the request");
                    return DispatchOutcome::Handled(response);
                }
                Ok(false) => {}
                Err(message) if response.is_committed() => {
                    tracing::error!(plugin_id = %id, object_type = %request.object_type, error = %message, "rest handler faulted after committing response");
                    return DispatchOutcome::Aborted { plugin: id };
                }
                Err(message) => {
                    tracing::error!(plugin_id = %id, object_type = %request.object_type, error = %message, "rest handler faulted");
                    faulted.push(id);
                }
            }
        }

        if faulted.is_empty() {
            DispatchOutcome::NotClaimed
        } else {
            DispatchOutcome::Faulted { plugins: faulted }
        }
    }

    /// Fan out to every trigger matching `(object_type, action)`
    ///
    /// Results come back in registration order; failing handlers are logged
    /// and left out.
    pub async fn route(&self, object_type: &str, action: &str, params: Vec<Value>) -> Vec<Value> {
        let triggers: Vec<(String, Trigger)> = {
            let tables = self.shared.tables.read().await;
            tables
                .active()
                .flat_map(|e| {
                    e.triggers
                        .iter()
                        .filter(|t| t.matches(object_type, action))
                        .map(|t| (e.identity.id.clone(), t.clone()))
                })
                .collect()
        };

        let mut results = Vec::with_capacity(triggers.len());
        for (id, trigger) in triggers {
            let handler = Arc::clone(&trigger.handler);
            let args = params.clone();
            let outcome = match guard_sync(move || Ok(handler(args))) {
                Ok(fut) => guard_async(fut).await,
                Err(message) => Err(message),
            };
            match outcome {
                Ok(value) => results.push(value),
                Err(message) => {
                    tracing::warn!(plugin_id = %id, object_type = %object_type, action = %action, error = %message, "trigger handler failed");
                }
            }
        }
        results
    }

    /// Send a message on behalf of `from`
    ///
    /// # Errors
    ///
    /// See [`PluginInterface::send_message_to_plugin`](super::PluginInterface::send_message_to_plugin)
    pub async fn send_message(&self, from: &str, to: &str, body: Value) -> Result<Value> {
        self.shared.send_message(from, to, body).await
    }

    pub async fn state(&self, id: &str) -> Option<PluginState> {
        self.shared.tables.read().await.entry(id).map(|e| e.state)
    }

    pub async fn list(&self) -> Vec<PluginInfo> {
        let tables = self.shared.tables.read().await;
        let routes = tables.routes.routes();
        tables.entries.iter().map(|e| e.info(&routes)).collect()
    }

    pub async fn info(&self, id: &str) -> Option<PluginInfo> {
        let tables = self.shared.tables.read().await;
        let routes = tables.routes.routes();
        tables.entry(id).map(|e| e.info(&routes))
    }

    /// Redacted configuration of an active plugin
    ///
    /// # Errors
    ///
    /// Returns [`Error::PluginNotFound`] or [`Error::PluginNotActive`]
    pub async fn active_config(&self, id: &str) -> Result<Map<String, Value>> {
        let tables = self.shared.tables.read().await;
        let entry = tables
            .entry(id)
            .ok_or_else(|| Error::PluginNotFound(id.to_string()))?;
        match (&entry.state, &entry.config) {
            (PluginState::Active, Some(config)) => Ok(config.redacted()),
            _ => Err(Error::PluginNotActive(id.to_string())),
        }
    }

    pub async fn conflicts(&self) -> Vec<ConflictRecord> {
        self.shared.tables.read().await.conflicts.clone()
    }

    pub async fn session_types(&self) -> Vec<PluginSessionType> {
        let tables = self.shared.tables.read().await;
        tables
            .active()
            .flat_map(|e| {
                e.session_types.iter().map(|s| PluginSessionType {
                    plugin: e.identity.id.clone(),
                    session_type: s.clone(),
                })
            })
            .collect()
    }

    pub async fn routes(&self) -> Vec<RouteInfo> {
        self.shared.tables.read().await.routes.routes()
    }

    pub async fn mounts(&self) -> Vec<MountInfo> {
        self.shared.tables.read().await.routes.mounts()
    }

    pub async fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.shared.tables.read().await.routes.match_route(method, path)
    }

    pub async fn match_static(&self, path: &str) -> Option<MountMatch> {
        self.shared.tables.read().await.routes.match_mount(path)
    }

    /// Number of (active, total) plugins
    pub async fn counts(&self) -> (usize, usize) {
        let tables = self.shared.tables.read().await;
        (tables.active().count(), tables.entries.len())
    }

    /// Number of plugins whose last registration attempt failed
    ///
    /// Plugins an operator unregistered on purpose are not counted.
    pub async fn failed(&self) -> usize {
        let tables = self.shared.tables.read().await;
        tables
            .entries
            .iter()
            .filter(|e| e.last_error.is_some())
            .count()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}
