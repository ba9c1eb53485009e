//! Plugin hosting
//!
//! Plugins implement [`Plugin`] and are registered with a [`PluginRegistry`],
//! which hands each one a [`CoreModule`] scoped to its identity, merges the
//! contributions from its [`PluginInitResponse`] and dispatches generic REST
//! requests, triggers and messages to it.

pub mod builtin;
mod catalog;
mod contract;
mod core_module;
mod guard;
mod manifest;
mod registry;
mod rest;
mod routes;
mod schema;

pub use catalog::{LoadFailure, LoadReport, PluginCatalog};
pub use contract::{Capabilities, Plugin, PluginMessage};
pub use core_module::{CoreModule, HostServices, PluginIdentity, PluginInterface, PluginLogger};
pub use manifest::{
    PluginInitResponse, PublicHandler, RouteHandler, SessionType, StaticFolder, Trigger,
    TriggerHandler,
};
pub use registry::{
    ConflictRecord, DispatchOutcome, PluginInfo, PluginRegistry, PluginSessionType, PluginState,
    Registration,
};
pub use rest::{RestApiRequest, RestResponse};
pub use routes::{
    HOST_OWNER, HOST_PATHS, HOST_PREFIXES, MountInfo, MountMatch, RESERVED_PREFIX, RouteInfo, RouteMatch, RouteParams,
    RoutePattern, RouteTable,
};
pub use schema::{ConfDescription, DataType, PluginConfig, SECRET_SENTINEL};

pub(crate) use guard::panic_message;
