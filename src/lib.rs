//! Tenant Host - plugin hosting core for a multi-tenant server platform
//!
//! Independently developed plugins are registered with a
//! [`PluginRegistry`](plugins::PluginRegistry), receive a
//! [`CoreModule`](plugins::CoreModule) granting access to shared services,
//! and contribute routes, static mounts, triggers and session types to the
//! live server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     HTTP API                         │
//! │  /restapi/{objectType}/...  │  plugin routes  │ admin │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Plugin Registry                      │
//! │  register │ unregister │ dispatch_rest │ route      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ CoreModule
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Shared services                      │
//! │  logins  │  key-value  │  data models  │  logging   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod common;
pub mod config;
pub mod db;
pub mod error;
pub mod host;
pub mod kv;
pub mod login;
pub mod plugins;
pub mod status;

pub use common::Common;
pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use host::Host;
pub use kv::{CommandClient, CommandReply, MemoryCommandStore};
pub use login::{Login, LoginGateway, LoginParams, LoginStore};
pub use plugins::{
    CoreModule, DispatchOutcome, Plugin, PluginCatalog, PluginInitResponse, PluginRegistry,
    PluginState,
};
pub use status::{Action, Status};
