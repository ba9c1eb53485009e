//! Per-plugin capability surface
//!
//! A [`CoreModule`] is built by the registry for each plugin and handed to
//! `init`. It is frozen once constructed: plugins can read through it but
//! cannot change their own identity or anyone else's capabilities.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::registry::Shared;
use crate::common::Common;
use crate::config::{Config, DEFAULT_MESSAGE_TIMEOUT};
use crate::db::{self, DbPool, Model, ModelDefinition, ModelRegistry};
use crate::kv::{CommandClient, CommandReply, MemoryCommandStore};
use crate::login::{Login, LoginGateway, LoginParams};
use crate::{Error, Result};

/// Identity the registry assigns to a plugin
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PluginIdentity {
    pub id: String,
    pub name: String,
    pub version: String,
}

/// Logger tagged with a plugin and a component
///
/// The tags are fixed at construction.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin: Arc<str>,
    component: Arc<str>,
}

impl PluginLogger {
    #[must_use]
    pub fn new(plugin: &str, component: &str) -> Self {
        Self {
            plugin: Arc::from(plugin),
            component: Arc::from(component),
        }
    }

    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn trace(&self, message: &str) {
        tracing::trace!(plugin = %self.plugin, component = %self.component, "{message}");
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(plugin = %self.plugin, component = %self.component, "{message}");
    }

    pub fn info(&self, message: &str) {
        tracing::info!(plugin = %self.plugin, component = %self.component, "{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(plugin = %self.plugin, component = %self.component, "{message}");
    }

    pub fn error(&self, message: &str) {
        tracing::error!(plugin = %self.plugin, component = %self.component, "{message}");
    }
}

/// Shared services the registry scopes into each `CoreModule`
#[derive(Clone)]
pub struct HostServices {
    pub common: Arc<Common>,
    pub logins: LoginGateway,
    pub commands: Arc<dyn CommandClient>,
    pub models: ModelRegistry,
    pub message_timeout: Duration,
}

impl HostServices {
    /// Services backed by `pool`, with an in-process key-value store
    #[must_use]
    pub fn new(config: &Config, pool: DbPool) -> Self {
        Self {
            common: Common::from_config(&config.platform),
            logins: LoginGateway::new(Arc::new(crate::login::SqliteLoginStore::new(pool.clone()))),
            commands: Arc::new(MemoryCommandStore::new()),
            models: ModelRegistry::new(pool),
            message_timeout: config.message_timeout,
        }
    }

    /// Fully in-memory services with default settings
    ///
    /// # Errors
    ///
    /// Returns error if the in-memory database cannot be initialized
    pub fn in_memory() -> Result<Self> {
        let pool = db::init_memory()?;
        Ok(Self {
            common: Common::from_config(&crate::config::PlatformConfig::default()),
            logins: LoginGateway::in_memory(),
            commands: Arc::new(MemoryCommandStore::new()),
            models: ModelRegistry::new(pool),
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
        })
    }

    #[must_use]
    pub const fn message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("message_timeout", &self.message_timeout)
            .finish_non_exhaustive()
    }
}

/// Inter-plugin messaging and data-model registration
#[derive(Clone)]
pub struct PluginInterface {
    sender: String,
    registry: Weak<Shared>,
    models: ModelRegistry,
}

impl PluginInterface {
    /// Deliver `message` to another plugin and wait for its reply
    ///
    /// # Errors
    ///
    /// Returns [`Error::PluginNotActive`] if the target is not active,
    /// [`Error::PluginNotFound`] if it does not exist,
    /// [`Error::MessageTimeout`] if it does not answer in time, or
    /// [`Error::PluginRequest`] if it rejects the message
    pub async fn send_message_to_plugin(&self, plugin_id: &str, message: Value) -> Result<Value> {
        let Some(registry) = self.registry.upgrade() else {
            return Err(Error::PluginNotActive(plugin_id.to_string()));
        };
        registry.send_message(&self.sender, plugin_id, message).await
    }

    /// Declare a table for this plugin's own entities
    ///
    /// # Errors
    ///
    /// Returns error if the definition is invalid or the table cannot be created
    pub fn define_db_model(&self, name: &str, definition: ModelDefinition) -> Result<Model> {
        self.models.define(&self.sender, name, definition)
    }

    /// Models this plugin has declared
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be read
    pub fn db_models(&self) -> Result<Vec<String>> {
        self.models.list(&self.sender)
    }
}

struct Inner {
    identity: PluginIdentity,
    common: Arc<Common>,
    logger: PluginLogger,
    logins: LoginGateway,
    commands: Arc<dyn CommandClient>,
    plugins: PluginInterface,
}

/// Capability bundle handed to a plugin at init
#[derive(Clone)]
pub struct CoreModule {
    inner: Arc<Inner>,
}

impl CoreModule {
    pub(crate) fn new(
        identity: PluginIdentity,
        services: &HostServices,
        registry: Weak<Shared>,
    ) -> Self {
        let plugins = PluginInterface {
            sender: identity.id.clone(),
            registry,
            models: services.models.clone(),
        };
        Self {
            inner: Arc::new(Inner {
                logger: PluginLogger::new(&identity.id, &identity.name),
                identity,
                common: Arc::clone(&services.common),
                logins: services.logins.clone(),
                commands: Arc::clone(&services.commands),
                plugins,
            }),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &PluginIdentity {
        &self.inner.identity
    }

    #[must_use]
    pub fn common(&self) -> &Common {
        &self.inner.common
    }

    /// Logger tagged with this plugin
    #[must_use]
    pub fn logger(&self) -> &PluginLogger {
        &self.inner.logger
    }

    /// Logger tagged with this plugin and `file_name`
    #[must_use]
    pub fn get_logger(&self, file_name: &str) -> PluginLogger {
        PluginLogger::new(&self.inner.identity.id, file_name)
    }

    /// Resolve a login token
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoginResolution`] if the login store is unreachable
    pub async fn get_login(&self, token: &str) -> Result<Option<Login>> {
        self.inner.logins.get_login(token).await
    }

    /// Mint and persist a new login
    ///
    /// # Errors
    ///
    /// Returns error if the login store rejects the write
    pub async fn create_login(&self, params: LoginParams) -> Result<Login> {
        self.inner.logins.create_login(params).await
    }

    #[must_use]
    pub fn commands(&self) -> &Arc<dyn CommandClient> {
        &self.inner.commands
    }

    /// Run a key-value command
    ///
    /// # Errors
    ///
    /// Returns error if the command is unknown or malformed
    pub async fn send_command(&self, command: &str, args: &[&str]) -> Result<CommandReply> {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        self.inner.commands.send_command(command, &args).await
    }

    #[must_use]
    pub fn plugins(&self) -> &PluginInterface {
        &self.inner.plugins
    }
}

impl std::fmt::Debug for CoreModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreModule")
            .field("identity", &self.inner.identity)
            .finish_non_exhaustive()
    }
}
