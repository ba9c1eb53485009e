//! Platform settings shared with every plugin

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::PlatformConfig;
use crate::plugins::{HOST_OWNER, PluginLogger};

/// Minimum supported UXIP protocol version
pub const MIN_UXIP_VERSION: u32 = 1;

/// Product edition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    #[default]
    Community,
    Enterprise,
}

impl Edition {
    /// Parse from string, falling back to community
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("enterprise") {
            Self::Enterprise
        } else {
            Self::Community
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Community => "community",
            Self::Enterprise => "enterprise",
        }
    }
}

/// Client device category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
}

/// Sender identity for outgoing platform email
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmailSender {
    pub sender_email: String,
    pub sender_name: String,
}

/// Read-only snapshot of platform settings
///
/// Built once from configuration at host startup and shared by every
/// plugin's [`CoreModule`](crate::plugins::CoreModule).
#[derive(Debug, Clone, Serialize)]
pub struct Common {
    pub server_url: String,
    pub internal_url: String,
    pub dc_url: String,
    pub dc_name: String,
    pub dc_internal_url: String,
    /// No other data center shares this database
    pub single_data_center: bool,
    pub edition: Edition,
    pub platform_type: String,
    pub session_timeout_secs: u64,
    pub activation_timeout_secs: u64,
    pub otp_timeout_secs: u64,
    pub otp_max_tries: u32,
    pub default_locale: String,
    pub default_time_zone: String,
    pub default_app_name: String,
    pub email_sender: EmailSender,
    pub root_dir: PathBuf,
    pub is_daemon_process: bool,
}

impl Common {
    /// Build the settings snapshot from platform configuration
    #[must_use]
    pub fn from_config(config: &PlatformConfig) -> Arc<Self> {
        Arc::new(Self {
            server_url: config.server_url.clone(),
            internal_url: config.internal_url.clone(),
            dc_url: config.server_url.clone(),
            dc_name: config.dc_name.clone(),
            dc_internal_url: config.dc_internal_url.clone(),
            single_data_center: config.single_data_center,
            edition: config.edition,
            platform_type: config.platform_type.clone(),
            session_timeout_secs: config.session_timeout_secs,
            activation_timeout_secs: config.activation_timeout_secs,
            otp_timeout_secs: config.otp_timeout_secs,
            otp_max_tries: config.otp_max_tries,
            default_locale: config.default_locale.clone(),
            default_time_zone: config.default_time_zone.clone(),
            default_app_name: config.app_name.clone(),
            email_sender: EmailSender {
                sender_email: config.sender_email.clone(),
                sender_name: config.sender_name.clone(),
            },
            root_dir: std::env::current_dir().unwrap_or_default(),
            is_daemon_process: false,
        })
    }

    #[must_use]
    pub const fn is_enterprise_edition(&self) -> bool {
        matches!(self.edition, Edition::Enterprise)
    }

    #[must_use]
    pub const fn get_edition(&self) -> Edition {
        self.edition
    }

    /// Device categories this deployment serves
    ///
    /// A `platform_type` of "mobile" or "desktop" restricts the list;
    /// anything else serves both.
    #[must_use]
    pub fn get_device_types(&self) -> Vec<DeviceType> {
        match self.platform_type.as_str() {
            "mobile" => vec![DeviceType::Mobile],
            "desktop" => vec![DeviceType::Desktop],
            _ => vec![DeviceType::Desktop, DeviceType::Mobile],
        }
    }

    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.get_device_types().contains(&DeviceType::Mobile)
    }

    #[must_use]
    pub fn is_desktop(&self) -> bool {
        self.get_device_types().contains(&DeviceType::Desktop)
    }

    /// Logger for host code, tagged with `file_name`
    #[must_use]
    pub fn get_logger(&self, file_name: &str) -> PluginLogger {
        PluginLogger::new(HOST_OWNER, file_name)
    }
}
