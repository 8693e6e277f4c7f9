//! Plugin host error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the plugin host
#[derive(Error, Debug)]
pub enum PluginHostError {
    /// A search root (or a directory below it) could not be scanned
    #[error("Cannot scan plugin root {path}: {source}")]
    DiscoveryRootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The plugin's start hook failed
    #[error("Plugin '{name}' failed to start: {message}")]
    InitializationFailed { name: String, message: String },

    /// The plugin's migration hook failed
    #[error("Plugin '{name}' failed to migrate: {message}")]
    MigrationFailed { name: String, message: String },

    /// The plugin's stop hook failed (teardown still completed)
    #[error("Plugin '{name}' failed to stop cleanly: {message}")]
    StopFailed { name: String, message: String },

    /// A lifecycle method was called in a state that does not allow it
    #[error("Plugin '{name}' cannot go from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: String,
        to: String,
    },

    /// The module path has no usable file stem
    #[error("Cannot derive a plugin name from {path}")]
    InvalidModulePath { path: PathBuf },

    /// API version mismatch between ferry and plugin
    #[error("API version mismatch: ferry expects {expected}, plugin has {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },

    /// Failed to load dynamic library
    #[error("Failed to load plugin library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// A lifecycle hook panicked
    #[error("Plugin '{name}' panicked")]
    PluginPanicked { name: String },

    /// File watching failed
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Configuration error (parsing, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginHostError {
    /// Name of the plugin the error concerns, if any
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            Self::InitializationFailed { name, .. }
            | Self::MigrationFailed { name, .. }
            | Self::StopFailed { name, .. }
            | Self::InvalidTransition { name, .. }
            | Self::PluginPanicked { name } => Some(name),
            _ => None,
        }
    }
}
