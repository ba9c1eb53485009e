//! Host process: wires storage, registry, plugins and the HTTP server

use tokio::sync::mpsc;

use crate::api::{ApiServer, ApiServerBuilder};
use crate::config::Config;
use crate::db;
use crate::plugins::{HostServices, LoadReport, PluginCatalog, PluginRegistry};
use crate::Result;

/// The plugin host
pub struct Host {
    config: Config,
    catalog: PluginCatalog,
    registry: PluginRegistry,
}

impl Host {
    /// Open storage and build the registry
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened
    pub fn new(config: Config, catalog: PluginCatalog) -> Result<Self> {
        let pool = match &config.database {
            Some(path) => db::init(path)?,
            None => {
                tracing::warn!("no database configured, logins and models are kept in memory");
                db::init_memory()?
            }
        };
        let registry = PluginRegistry::new(HostServices::new(&config, pool));

        Ok(Self {
            config,
            catalog,
            registry,
        })
    }

    #[must_use]
    pub const fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Register the configured plugins in config order
    pub async fn load_plugins(&self) -> LoadReport {
        let report = self.catalog.load(&self.registry, &self.config.plugins).await;
        for failure in &report.failed {
            tracing::warn!(name = %failure.name, error = %failure.error, "plugin not loaded");
        }
        for conflict in &report.conflicts {
            tracing::warn!(
                method = %conflict.method,
                path = %conflict.path,
                owner = %conflict.owner,
                contender = %conflict.contender,
                "route conflict"
            );
        }
        report
    }

    #[must_use]
    pub fn api_server(&self) -> ApiServer {
        ApiServerBuilder::new(
            self.registry.clone(),
            self.registry.services().logins.clone(),
            self.config.server.port,
        )
        .api_key(self.config.server.api_key.clone())
        .static_dir(self.config.server.static_dir.clone())
        .build()
    }

    /// Load plugins, serve until Ctrl-C, then unregister every plugin
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails
    pub async fn run(self) -> Result<()> {
        let report = self.load_plugins().await;
        tracing::info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            "plugin host ready"
        );

        // Set up shutdown signal
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                let _ = shutdown_tx.send(()).await;
            }
        });

        let result = self
            .api_server()
            .run_until(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await;

        tracing::info!("unregistering plugins");
        self.registry.unregister_all().await;
        result
    }
}
