//! Plugin host configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;


/// Default quiet period before a burst of file events is processed
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Configuration for PluginHost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginHostConfig {
    /// Directories scanned (recursively) for plugin modules
    pub search_roots: Vec<PathBuf>,
    /// Also scan the directory containing the host executable
    pub include_host_dir: bool,
    /// Module file extension, without the leading dot
    pub extension: String,
    /// Quiet period for coalescing file events, in milliseconds (0 = off)
    pub debounce_ms: u64,
    /// Parent of the per-plugin data directories handed to migrations
    pub data_dir: PathBuf,
}

impl Default for PluginHostConfig {
    fn default() -> Self {
        Self {
            search_roots: vec![ferry_paths::config_dir().join("plugins")],
            include_host_dir: false,
            extension: default_extension().to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            data_dir: ferry_paths::data_dir().join("plugins"),
        }
    }
}

/// Shared library extension of the current platform
pub fn default_extension() -> &'static str {
    if cfg!(target_os = "macos") {
        "dylib"
    } else if cfg!(target_os = "windows") {
        "dll"
    } else {
        "so"
    }
}

impl PluginHostConfig {
    /// Config scanning exactly the given roots, other fields defaulted
    pub fn with_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_roots: roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Builder: set the module extension
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Builder: set the debounce window
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Debounce window as a duration
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Extension filter, normalised: lowercase, no leading dot
    pub fn normalized_extension(&self) -> String {
        self.extension.trim_start_matches('.').to_ascii_lowercase()
    }

    /// The roots discovery actually scans, host directory first
    pub fn effective_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::with_capacity(self.search_roots.len() + 1);
        if self.include_host_dir {
            match ferry_paths::host_install_dir() {
                Some(dir) => roots.push(dir),
                None => tracing::warn!("Host install directory unknown, not scanning it"),
            }
        }
        roots.extend(self.search_roots.iter().cloned());
        roots
    }

    /// Data directory handed to the named plugin's migrations
    pub fn plugin_data_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Whether a path carries the configured module extension
    pub fn matches_extension(&self, path: &Path) -> bool {
        let wanted = self.normalized_extension();
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&wanted))
    }
}
