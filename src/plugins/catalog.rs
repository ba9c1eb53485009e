//! Catalog of compiled-in plugins
//!
//! Plugins are linked into the binary and looked up by the name used in the
//! `[[plugins]]` config array. Loading walks the config in order, so the
//! config fixes registration order.

use std::sync::Arc;

use serde::Serialize;

use super::builtin::HelloPlugin;
use super::contract::Plugin;
use super::core_module::PluginIdentity;
use super::registry::{ConflictRecord, PluginRegistry};
use crate::Error;
use crate::config::PluginEntryConfig;

type Factory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Name to factory mapping, in insertion order
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: Vec<(String, Factory)>,
}

/// A plugin that could not be registered
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of loading the configured plugins
#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    pub registered: Vec<PluginIdentity>,
    pub failed: Vec<LoadFailure>,
    pub conflicts: Vec<ConflictRecord>,
    pub skipped: Vec<String>,
}

impl LoadReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.conflicts.is_empty()
    }
}

impl PluginCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of every plugin shipped with the host
    #[must_use]
    pub fn builtin() -> Self {
        Self::new().with("hello", || Arc::new(HelloPlugin::new()))
    }

    /// Add a factory; a later factory with the same name replaces the earlier one
    #[must_use]
    pub fn with<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.retain(|(n, _)| n != name);
        self.factories.push((name.to_string(), Arc::new(factory)));
        self
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[must_use]
    pub fn create(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, factory)| factory())
    }

    /// Register `entries` in order, continuing past failures
    pub async fn load<'a>(
        &self,
        registry: &PluginRegistry,
        entries: impl IntoIterator<Item = &'a PluginEntryConfig>,
    ) -> LoadReport {
        let mut report = LoadReport::default();

        for entry in entries {
            if !entry.enabled {
                tracing::debug!(name = %entry.name, "plugin disabled in config");
                report.skipped.push(entry.name.clone());
                continue;
            }

            let Some(plugin) = self.create(&entry.name) else {
                tracing::warn!(name = %entry.name, "unknown plugin in config");
                report.failed.push(LoadFailure {
                    name: entry.name.clone(),
                    error: "not in catalog".to_string(),
                });
                continue;
            };

            match registry.register(plugin, entry.config.clone()).await {
                Ok(registration) => {
                    for conflict in registration.conflicts {
                        if let Error::RouteConflict {
                            method,
                            path,
                            owner,
                            contender,
                        } = conflict
                        {
                            report.conflicts.push(ConflictRecord {
                                method,
                                path,
                                owner,
                                contender,
                            });
                        }
                    }
                    report.registered.push(registration.identity);
                }
                Err(e) => report.failed.push(LoadFailure {
                    name: entry.name.clone(),
                    error: e.to_string(),
                }),
            }
        }

        tracing::info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            conflicts = report.conflicts.len(),
            skipped = report.skipped.len(),
            "plugins loaded"
        );
        report
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::*;
    use crate::plugins::HostServices;

    fn entry(name: &str, enabled: bool, config: Value) -> PluginEntryConfig {
        PluginEntryConfig {
            name: name.to_string(),
            enabled,
            config: config.as_object().cloned().unwrap_or_else(Map::new),
        }
    }

    #[test]
    fn builtin_names() {
        let catalog = PluginCatalog::builtin();
        assert_eq!(catalog.names(), vec!["hello"]);
        assert!(catalog.create("hello").is_some());
        assert!(catalog.create("missing").is_none());
    }

    #[tokio::test]
    async fn load_reports_each_outcome() {
        let registry = PluginRegistry::new(HostServices::in_memory().unwrap());
        let catalog = PluginCatalog::builtin();
        let entries = vec![
            entry("hello", true, json!({"apiKey": "secret"})),
            entry("missing", true, json!({})),
            entry("hello", false, json!({})),
            // Second instance lacks the required key
            entry("hello", true, json!({})),
        ];

        let report = catalog.load(&registry, &entries).await;
        assert_eq!(report.registered.len(), 1);
        assert_eq!(report.registered[0].id, "hello");
        assert_eq!(report.skipped, vec!["hello"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].name, "missing");
        assert!(report.failed[1].error.contains("apiKey"));
        assert!(!report.is_clean());
    }
}
