//! Configuration management for the plugin host

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::Result;
use crate::common::Edition;
use file::HostConfigFile;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8443;

/// Default inter-plugin message timeout
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Plugin host configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Platform settings exposed to plugins
    pub platform: PlatformConfig,

    /// `SQLite` database path; in-memory when `None`
    pub database: Option<PathBuf>,

    /// How long a sender waits for a plugin's message handler
    pub message_timeout: Duration,

    /// Plugins in registration order
    pub plugins: Vec<PluginEntryConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            platform: PlatformConfig::default(),
            database: None,
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            plugins: Vec::new(),
        }
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// API key for admin endpoints (from `TENANT_HOST_API_KEY` env)
    pub api_key: Option<String>,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_key: None,
            static_dir: None,
        }
    }
}

/// Platform settings
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub server_url: String,
    pub internal_url: String,
    pub dc_name: String,
    pub dc_internal_url: String,
    pub single_data_center: bool,
    pub edition: Edition,
    pub platform_type: String,
    pub session_timeout_secs: u64,
    pub activation_timeout_secs: u64,
    pub otp_timeout_secs: u64,
    pub otp_max_tries: u32,
    pub default_locale: String,
    pub default_time_zone: String,
    pub app_name: String,
    pub sender_email: String,
    pub sender_name: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            server_url: format!("https://localhost:{DEFAULT_PORT}"),
            internal_url: format!("http://127.0.0.1:{DEFAULT_PORT}"),
            dc_name: "default".to_string(),
            dc_internal_url: format!("http://127.0.0.1:{DEFAULT_PORT}"),
            single_data_center: true,
            edition: Edition::Community,
            platform_type: "docker".to_string(),
            session_timeout_secs: 600,
            activation_timeout_secs: 48 * 3600,
            otp_timeout_secs: 300,
            otp_max_tries: 3,
            default_locale: "en".to_string(),
            default_time_zone: "Etc/UTC".to_string(),
            app_name: "Tenant Host".to_string(),
            sender_email: String::new(),
            sender_name: String::new(),
        }
    }
}

/// A configured plugin
#[derive(Debug, Clone)]
pub struct PluginEntryConfig {
    /// Catalog name
    pub name: String,
    pub enabled: bool,
    /// Raw plugin settings, validated at registration
    pub config: Map<String, Value>,
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// With an explicit `path` the file must exist and parse. Without one,
    /// the standard path is used when present.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };

        let mut config = Self::from_file(fc)?;
        config.apply_env();
        Ok(config)
    }

    /// Build configuration from a parsed file, filling defaults
    ///
    /// # Errors
    ///
    /// Returns error if plugin settings cannot be represented as JSON
    pub fn from_file(fc: HostConfigFile) -> Result<Self> {
        let defaults = PlatformConfig::default();
        let p = fc.platform;

        let platform = PlatformConfig {
            server_url: p.server_url.unwrap_or(defaults.server_url),
            internal_url: p.internal_url.unwrap_or(defaults.internal_url),
            dc_name: p.dc_name.unwrap_or(defaults.dc_name),
            dc_internal_url: p.dc_internal_url.unwrap_or(defaults.dc_internal_url),
            single_data_center: p.single_data_center.unwrap_or(defaults.single_data_center),
            edition: p.edition.as_deref().map_or(defaults.edition, Edition::parse),
            platform_type: p.platform_type.unwrap_or(defaults.platform_type),
            session_timeout_secs: p
                .session_timeout_secs
                .unwrap_or(defaults.session_timeout_secs),
            activation_timeout_secs: p
                .activation_timeout_secs
                .unwrap_or(defaults.activation_timeout_secs),
            otp_timeout_secs: p.otp_timeout_secs.unwrap_or(defaults.otp_timeout_secs),
            otp_max_tries: p.otp_max_tries.unwrap_or(defaults.otp_max_tries),
            default_locale: p.default_locale.unwrap_or(defaults.default_locale),
            default_time_zone: p.default_time_zone.unwrap_or(defaults.default_time_zone),
            app_name: p.app_name.unwrap_or(defaults.app_name),
            sender_email: p.sender_email.unwrap_or(defaults.sender_email),
            sender_name: p.sender_name.unwrap_or(defaults.sender_name),
        };

        let server = ServerConfig {
            port: fc.server.port.unwrap_or(DEFAULT_PORT),
            api_key: fc.server.api_key,
            static_dir: fc.server.static_dir.map(PathBuf::from),
        };

        let plugins = fc
            .plugins
            .into_iter()
            .map(|entry| -> Result<PluginEntryConfig> {
                let config = match serde_json::to_value(entry.config)? {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                Ok(PluginEntryConfig {
                    name: entry.name,
                    enabled: entry.enabled,
                    config,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            server,
            platform,
            database: fc.storage.database.map(PathBuf::from),
            message_timeout: fc
                .messaging
                .timeout_secs
                .map_or(DEFAULT_MESSAGE_TIMEOUT, Duration::from_secs),
            plugins,
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("TENANT_HOST_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(key) = std::env::var("TENANT_HOST_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Ok(db) = std::env::var("TENANT_HOST_DATABASE") {
            self.database = Some(PathBuf::from(db));
        }
    }

    /// Enabled plugin entries in registration order
    pub fn enabled_plugins(&self) -> impl Iterator<Item = &PluginEntryConfig> {
        self.plugins.iter().filter(|p| p.enabled)
    }
}
