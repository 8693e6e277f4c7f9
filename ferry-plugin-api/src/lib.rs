//! ferry-plugin-api - Plugin API for the ferry plugin host
//!
//! This crate provides the traits and types needed to write plugins for
//! ferry. Plugins are native Rust dynamic libraries. The host discovers them
//! on disk, drives them through a fixed lifecycle and swaps them out when
//! their module file changes:
//!
//! ```text
//! start ──▶ migrate ──▶ (running) ──▶ stop ──▶ dispose
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ferry_plugin_api::{
//!     export_plugin, async_trait, MigrationContext, Plugin, PluginError, PluginManifest,
//! };
//!
//! #[derive(Default)]
//! pub struct MyPlugin;
//!
//! #[async_trait]
//! impl Plugin for MyPlugin {
//!     fn manifest(&self) -> PluginManifest {
//!         PluginManifest {
//!             name: "my-plugin".to_string(),
//!             version: "0.1.0".to_string(),
//!             ..Default::default()
//!         }
//!     }
//!
//!     async fn start(&mut self) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//!
//!     async fn migrate(&mut self, ctx: &MigrationContext) -> Result<(), PluginError> {
//!         ctx.log_info("schema up to date");
//!         Ok(())
//!     }
//! }
//!
//! export_plugin!(MyPlugin);
//! ```

pub mod context;
pub mod error;
pub mod services;
pub mod types;

pub use async_trait::async_trait;
pub use context::{MigrationContext, PluginConfig};
pub use error::PluginError;
pub use services::{ServiceCollection, ServiceInstance, ServiceProvider};
pub use types::*;

/// Current plugin API version. Plugins must match this exactly.
pub const API_VERSION: u32 = 1;

/// Symbol exported by dynamic plugins that returns their API version
pub const API_VERSION_SYMBOL: &[u8] = b"_ferry_plugin_api_version";

/// Symbol exported by dynamic plugins that creates the plugin instance
pub const CREATE_SYMBOL: &[u8] = b"_ferry_plugin_create";

/// The plugin entry contract.
///
/// The host calls these in order: [`services`](Plugin::services) once,
/// [`start`](Plugin::start), [`migrate`](Plugin::migrate), and on unload
/// [`stop`](Plugin::stop) followed by [`dispose`](Plugin::dispose).
/// Hooks may await I/O; they never run on the thread that delivers file
/// change notifications.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Return plugin metadata
    fn manifest(&self) -> PluginManifest;

    /// Services this plugin exposes. Called once, before `start`.
    fn services(&self) -> ServiceCollection {
        ServiceCollection::new()
    }

    /// Bring the plugin up. An error aborts the load.
    async fn start(&mut self) -> Result<(), PluginError>;

    /// Migrate schema or data. Must be idempotent: it runs on every load,
    /// including each hot reload.
    async fn migrate(&mut self, _ctx: &MigrationContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Stop the plugin. Errors are reported but teardown continues.
    async fn stop(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Release everything the plugin allocated. Runs after `stop`, and also
    /// after a failed `start` or `migrate`.
    async fn dispose(&mut self) {}
}

/// Export a plugin type for dynamic loading.
///
/// This macro generates the C ABI entry points that ferry uses to load
/// plugins dynamically. The plugin type must implement `Default`.
///
/// # Usage
///
/// ```ignore
/// ferry_plugin_api::export_plugin!(MyPlugin);
/// ```
///
/// # Generated Functions
///
/// - `_ferry_plugin_create()`: Creates a new plugin instance
/// - `_ferry_plugin_api_version()`: Returns the API version
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn _ferry_plugin_create() -> *mut dyn $crate::Plugin {
            let plugin: Box<dyn $crate::Plugin> = Box::new(<$plugin_type>::default());
            Box::into_raw(plugin)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _ferry_plugin_api_version() -> u32 {
            $crate::API_VERSION
        }
    };
}
