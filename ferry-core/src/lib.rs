//! ferry-core: plugin lifecycle orchestration with hot reload
//!
//! This crate provides the host side of ferry:
//!
//! - **Discovery** - [`plugins::discover`] scans search roots for module files
//! - **Isolated loading** - each plugin lives in its own [`plugins::LoadContext`]
//! - **Lifecycle** - [`plugins::PluginDescriptor`] drives start, migrate, stop
//!   and dispose
//! - **Services** - [`plugins::ServiceRegistry`] resolves plugin services with
//!   fallback to the host's
//! - **Hot reload** - [`plugins::PluginWatcher`] feeds file changes to the
//!   [`PluginHost`], which orders work per plugin name
//!
//! Plugin authors depend on `ferry-plugin-api` only.

pub mod plugins;

pub use plugins::{
    ChangeEvent, LoadOutcome, PluginHost, PluginHostConfig, PluginHostError, PluginInfo,
    PluginWatcher, UnloadOutcome,
};
pub use ferry_plugin_api::{API_VERSION, Plugin, PluginManifest, ServiceCollection};
