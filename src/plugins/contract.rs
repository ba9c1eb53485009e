//! The contract every plugin implements

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::core_module::CoreModule;
use super::manifest::PluginInitResponse;
use super::rest::{RestApiRequest, RestResponse};
use super::schema::{ConfDescription, PluginConfig};

/// Which optional hooks a plugin implements
///
/// The registry consults this before every optional call, so a hook whose
/// flag is off is never invoked even if the trait method is overridden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    pub conf_descriptions: bool,
    pub deinit: bool,
    pub handle_message: bool,
    pub rest_api: bool,
}

impl Capabilities {
    /// Only the required hooks
    pub const NONE: Self = Self {
        conf_descriptions: false,
        deinit: false,
        handle_message: false,
        rest_api: false,
    };

    /// Every optional hook
    pub const ALL: Self = Self {
        conf_descriptions: true,
        deinit: true,
        handle_message: true,
        rest_api: true,
    };

    #[must_use]
    pub const fn with_conf_descriptions(mut self) -> Self {
        self.conf_descriptions = true;
        self
    }

    #[must_use]
    pub const fn with_deinit(mut self) -> Self {
        self.deinit = true;
        self
    }

    #[must_use]
    pub const fn with_handle_message(mut self) -> Self {
        self.handle_message = true;
        self
    }

    #[must_use]
    pub const fn with_rest_api(mut self) -> Self {
        self.rest_api = true;
        self
    }
}

/// Message delivered to another plugin's `handle_message`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginMessage {
    /// Id of the sending plugin
    pub from: String,
    /// Opaque payload, interpreted by the receiver
    pub body: Value,
}

/// A hosted plugin
///
/// Only `name`, `version` and `init` are required. Optional hooks must be
/// advertised through [`Plugin::capabilities`].
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Human-readable name; the registry derives the plugin id from it
    fn name(&self) -> &str;

    /// Version string (semver recommended)
    fn version(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Configuration keys this plugin accepts
    fn conf_descriptions(&self) -> Vec<ConfDescription> {
        Vec::new()
    }

    /// Activate the plugin
    ///
    /// The returned manifest is merged into the host before any traffic
    /// reaches the plugin. Long-running setup should be spawned rather than
    /// performed inline.
    ///
    /// # Errors
    ///
    /// Returns error if the plugin cannot start; it then stays unregistered
    fn init(&self, core: CoreModule, config: &PluginConfig) -> anyhow::Result<PluginInitResponse>;

    /// Release resources; must tolerate being called when not initialized
    ///
    /// # Errors
    ///
    /// Errors are logged by the registry and otherwise ignored
    fn deinit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle a message from another plugin
    ///
    /// # Errors
    ///
    /// Returns error to reject the message
    async fn handle_message(&self, message: PluginMessage) -> anyhow::Result<Value> {
        anyhow::bail!("plugin does not accept messages from {}", message.from)
    }

    /// Handle a generic REST request
    ///
    /// Return `Ok(true)` once the request has been fully handled, `Ok(false)`
    /// to let the next plugin try.
    ///
    /// # Errors
    ///
    /// An error is treated as "not claimed" unless the response was already
    /// written
    async fn handle_rest_api_request(
        &self,
        request: &RestApiRequest,
        response: &mut RestResponse,
    ) -> anyhow::Result<bool> {
        let _ = (request, response);
        Ok(false)
    }
}
