//! Error types for the plugin host

use thiserror::Error;

/// Result type alias for host operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the plugin host
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Plugin configuration failed schema validation
    #[error("invalid configuration for plugin {plugin}: key `{key}` {reason}")]
    ConfigValidation {
        plugin: String,
        key: String,
        reason: String,
    },

    /// Two contributions claimed the same method and path
    #[error("route conflict on {method} {path}: owned by {owner}, rejected for {contender}")]
    RouteConflict {
        method: String,
        path: String,
        owner: String,
        contender: String,
    },

    /// Plugin init raised
    #[error("plugin {plugin} failed to initialize: {message}")]
    PluginInit { plugin: String, message: String },

    /// Plugin request or message hook raised
    #[error("plugin {plugin} faulted while handling a request: {message}")]
    PluginRequest { plugin: String, message: String },

    /// Target plugin exists but is not active
    #[error("plugin not active: {0}")]
    PluginNotActive(String),

    /// No plugin with this id
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// Message delivery exceeded the configured timeout
    #[error("message to plugin {plugin} timed out")]
    MessageTimeout { plugin: String },

    /// Login token could not be resolved
    #[error("login resolution failed: {0}")]
    LoginResolution(String),

    /// Plugin data model error
    #[error("model error: {0}")]
    Model(String),

    /// Key-value command error
    #[error("command error: {0}")]
    Command(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
