//! Hello Plugin - A simple example plugin for ferry
//!
//! This plugin demonstrates:
//! - Basic plugin structure with the `export_plugin!` macro
//! - Exposing a service other plugins and the host can resolve
//! - An idempotent migration that runs on every (re)load
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! ```bash
//! mkdir -p ~/.config/ferry/plugins
//! cp target/release/libhello_plugin.so ~/.config/ferry/plugins/hello.so
//! ferry run --watch
//! ```
//!
//! Rebuilding and copying the library again while `ferry run --watch` is
//! running swaps the plugin in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ferry_plugin_api::{
    MigrationContext, Plugin, PluginError, PluginManifest, ServiceCollection, async_trait,
    export_plugin,
};

/// Counts greetings. Exposed as a service.
#[derive(Debug, Default)]
pub struct Greeter {
    greeted: AtomicU64,
}

impl Greeter {
    pub fn greet(&self, who: &str) -> String {
        self.greeted.fetch_add(1, Ordering::Relaxed);
        format!("Hello, {who}!")
    }

    pub fn greeted(&self) -> u64 {
        self.greeted.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct HelloPlugin {
    greeter: Arc<Greeter>,
}

#[async_trait]
impl Plugin for HelloPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            name: "hello".to_string(),
            version: "0.1.0".to_string(),
            description: "A simple example plugin that says hello".to_string(),
            author: "ferry-team".to_string(),
            ..Default::default()
        }
    }

    fn services(&self) -> ServiceCollection {
        ServiceCollection::new().with(self.greeter.clone())
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn migrate(&mut self, ctx: &MigrationContext) -> Result<(), PluginError> {
        let marker = ctx.data_dir().join("greeting.txt");
        if !marker.exists() {
            std::fs::create_dir_all(ctx.data_dir())?;
            let greeting = ctx
                .config_get::<String>("greeting")
                .unwrap_or_else(|| "Hello".to_string());
            std::fs::write(&marker, greeting)?;
        }
        ctx.log_info(&self.greeter.greet(ctx.plugin_name()));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

export_plugin!(HelloPlugin);
