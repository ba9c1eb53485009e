//! TOML configuration file loading
//!
//! Supports `~/.config/tenant-host/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HostConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Platform settings handed to plugins
    #[serde(default)]
    pub platform: PlatformFileConfig,

    /// Persistence configuration
    #[serde(default)]
    pub storage: StorageFileConfig,

    /// Inter-plugin messaging configuration
    #[serde(default)]
    pub messaging: MessagingFileConfig,

    /// Plugins to register, in registration order
    #[serde(default)]
    pub plugins: Vec<PluginFileConfig>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// API key for admin endpoints
    pub api_key: Option<String>,

    /// Static web UI directory
    pub static_dir: Option<String>,
}

/// Platform settings
#[derive(Debug, Default, Deserialize)]
pub struct PlatformFileConfig {
    pub server_url: Option<String>,
    pub internal_url: Option<String>,
    pub dc_name: Option<String>,
    pub dc_internal_url: Option<String>,
    pub single_data_center: Option<bool>,
    /// "community" or "enterprise"
    pub edition: Option<String>,
    pub platform_type: Option<String>,
    pub session_timeout_secs: Option<u64>,
    pub activation_timeout_secs: Option<u64>,
    pub otp_timeout_secs: Option<u64>,
    pub otp_max_tries: Option<u32>,
    pub default_locale: Option<String>,
    pub default_time_zone: Option<String>,
    pub app_name: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
}

/// Persistence configuration
#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// `SQLite` database path (in-memory when unset)
    pub database: Option<String>,
}

/// Messaging configuration
#[derive(Debug, Default, Deserialize)]
pub struct MessagingFileConfig {
    /// Seconds to wait for a plugin's message handler
    pub timeout_secs: Option<u64>,
}

/// A single `[[plugins]]` entry
#[derive(Debug, Deserialize)]
pub struct PluginFileConfig {
    /// Catalog name of the plugin
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Plugin-specific settings, validated against the plugin's schema
    #[serde(default)]
    pub config: toml::Table,
}

const fn default_true() -> bool {
    true
}

/// Load the TOML config file from the standard path
///
/// Returns `HostConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> HostConfigFile {
    let Some(path) = config_file_path() else {
        return HostConfigFile::default();
    };

    if !path.exists() {
        return HostConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            HostConfigFile::default()
        }
    }
}

/// Read and parse an explicit config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<HostConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/tenant-host/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("tenant-host").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_file() {
        let toml = r#"
            [server]
            port = 9000
            api_key = "secret"

            [platform]
            dc_name = "dc-east"
            edition = "enterprise"

            [messaging]
            timeout_secs = 5

            [[plugins]]
            name = "hello"
            config = { greeting = "hi", apiKey = "xyz" }

            [[plugins]]
            name = "audit"
            enabled = false
        "#;

        let file: HostConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(file.server.port, Some(9000));
        assert_eq!(file.platform.dc_name.as_deref(), Some("dc-east"));
        assert_eq!(file.messaging.timeout_secs, Some(5));
        assert_eq!(file.plugins.len(), 2);
        assert_eq!(file.plugins[0].name, "hello");
        assert!(file.plugins[0].enabled);
        assert_eq!(file.plugins[0].config["greeting"].as_str(), Some("hi"));
        assert!(!file.plugins[1].enabled);
    }

    #[test]
    fn empty_file_is_default() {
        let file: HostConfigFile = toml::from_str("").unwrap();
        assert!(file.server.port.is_none());
        assert!(file.plugins.is_empty());
    }

    #[test]
    fn read_missing_file_fails() {
        let err = read_config_file(Path::new("/nonexistent/tenant-host.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
