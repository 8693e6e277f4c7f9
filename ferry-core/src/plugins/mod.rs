//! Plugin system for ferry
//!
//! This module provides the infrastructure for loading and managing plugins:
//!
//! - [`PluginHost`]: Loads, unloads and hot-reloads plugins, and answers
//!   queries about the active set
//! - [`PluginWatcher`]: Turns filesystem notifications into [`ChangeEvent`]s
//!   for the host
//! - [`ModuleInspector`]: Describes the plugin inside a module file
//!   ([`DynamicLibraryInspector`] for shared libraries, [`BuiltinInspector`]
//!   for plugins compiled into the host)
//! - [`ServiceRegistry`]: Per-plugin services chained to the host's
//! - [`PluginHostError`]: Error types for plugin operations
//!
//! # Plugin Discovery
//!
//! Every search root (plus the host install directory when
//! `include_host_dir` is set) is scanned recursively for files with the
//! configured extension. A plugin is named after its module's file stem;
//! the name is unique in the active set.
//!
//! # Lifecycle
//!
//! ```text
//! load:   inspect ─▶ instantiate ─▶ start ─▶ migrate ─▶ insert
//! unload: remove ─▶ stop ─▶ dispose ─▶ release context
//! ```
//!
//! | Change  | Action                           |
//! |---------|----------------------------------|
//! | Created | load(path)                       |
//! | Deleted | unload(name)                     |
//! | Changed | unload(name), then load(path)    |
//! | Renamed | unload(old name), then load(new) |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ferry_core::plugins::{DynamicLibraryInspector, PluginHost, PluginHostConfig, PluginWatcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PluginHostConfig::with_roots(["/opt/ferry/plugins"]);
//! let host = PluginHost::new(config, Arc::new(DynamicLibraryInspector::new()));
//!
//! let report = host.load_plugins().await;
//! println!("loaded {:?}", report.loaded);
//!
//! let watcher = PluginWatcher::start(host.clone())?;
//! // ... later
//! watcher.shutdown().await;
//! host.unload_all().await;
//! # Ok(())
//! # }
//! ```
//!
//! Plugins compiled into the host are served by a [`BuiltinInspector`].
//! Registrations can change at runtime; a removed one is simply no longer
//! a plugin the next time its module is loaded.
//!
//! ```
//! use std::sync::Arc;
//! use ferry_core::plugins::{BuiltinInspector, LoadOutcome, PluginHost, PluginHostConfig};
//! use ferry_plugin_api::{Plugin, PluginError, PluginManifest, async_trait};
//!
//! #[derive(Default)]
//! struct Audit;
//!
//! #[async_trait]
//! impl Plugin for Audit {
//!     fn manifest(&self) -> PluginManifest {
//!         PluginManifest { name: "audit".into(), ..Default::default() }
//!     }
//!
//!     async fn start(&mut self) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let module = dir.path().join("audit.mod");
//! std::fs::write(&module, b"")?;
//!
//! let inspector = Arc::new(BuiltinInspector::new());
//! inspector.register_default::<Audit>("audit");
//! let mut config = PluginHostConfig::with_roots([dir.path()]).extension("mod");
//! config.data_dir = dir.path().join("data");
//! let host = PluginHost::new(config, inspector.clone());
//!
//! host.load(&module).await?;
//! assert!(host.is_loaded("audit").await);
//!
//! host.unload("audit").await?;
//! inspector.unregister("audit");
//! assert!(matches!(host.load(&module).await?, LoadOutcome::Skipped { .. }));
//! # Ok(())
//! # }
//! ```

mod config;
mod context;
mod descriptor;
mod discovery;
mod dynamic;
mod error;
mod events;
mod host;
mod inspector;
pub mod mock;
mod reporter;
mod sequencer;
mod services;
mod table;
mod watcher;

pub use config::{DEFAULT_DEBOUNCE_MS, PluginHostConfig, default_extension};
pub use context::LoadContext;
pub use descriptor::{LifecycleState, PluginDescriptor};
pub use discovery::{Discovery, discover, plugin_name};
pub use dynamic::DynamicLibraryInspector;
pub use error::PluginHostError;
pub use events::{ChangeEvent, Reduction, coalesce};
pub use host::{LoadOutcome, LoadReport, PluginHost, PluginHostBuilder, PluginInfo, UnloadOutcome};
pub use inspector::{BuiltinInspector, CapabilityDescriptor, InspectedModule, ModuleInspector, PluginFactory};
pub use reporter::{ChannelReporter, ErrorReporter, Operation, PluginFailure, TracingReporter};
pub use sequencer::{Sequencer, Ticket, TicketGuard};
pub use services::ServiceRegistry;
pub use table::{ActivePlugin, PluginTable, TableChange, TableChangeKind};
pub use watcher::PluginWatcher;
