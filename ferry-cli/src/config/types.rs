use ferry_core::PluginHostConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawFerryConfig {
    #[serde(default)]
    pub plugins: RawPluginsConfig,
}

/// `[plugins]` as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPluginsConfig {
    /// Directories scanned for plugin modules
    pub search_roots: Option<Vec<PathBuf>>,

    /// Also scan the directory holding the ferry executable
    pub include_host_dir: Option<bool>,

    /// Module file extension
    pub extension: Option<String>,

    /// Quiet period before file changes are applied
    pub debounce_ms: Option<u64>,

    /// Where plugins keep their data
    pub data_dir: Option<PathBuf>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FerryConfig {
    #[serde(default)]
    pub plugins: PluginHostConfig,
}
