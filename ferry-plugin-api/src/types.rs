//! Plugin metadata

use serde::{Deserialize, Serialize};

/// Plugin manifest containing metadata about the plugin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginManifest {
    /// Display name. The host keys plugins by module file stem, not by this.
    pub name: String,
    /// Plugin version (semver)
    pub version: String,
    /// API version this plugin was built against
    pub api_version: u32,
    /// Human-readable description
    pub description: String,
    /// Plugin author
    pub author: String,
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "0.0.1".to_string(),
            api_version: crate::API_VERSION,
            description: String::new(),
            author: String::new(),
        }
    }
}
