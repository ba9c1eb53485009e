//! Plugins shipped with the host

mod hello;

pub use hello::HelloPlugin;
