use super::types::{FerryConfig, RawFerryConfig, RawPluginsConfig};
use anyhow::Result;
use ferry_core::PluginHostConfig;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<FerryConfig> {
        let mut raw = RawFerryConfig::default();

        // Layer 1: User config
        let user_path = Self::user_config_path();
        if let Some(user_config) = Self::read_raw(&user_path)? {
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if let Some(project_config) = Self::read_raw(&project_path)? {
            raw = Self::merge_raw(raw, project_config);
        }

        Ok(Self::finalize(raw))
    }

    /// Load a single config file with defaults applied
    #[cfg(test)]
    pub fn load_from_path(path: &Path) -> Result<FerryConfig> {
        let raw = Self::read_raw(path)?.unwrap_or_default();
        Ok(Self::finalize(raw))
    }

    /// User config path, next to the default plugin root
    pub fn user_config_path() -> PathBuf {
        ferry_paths::config_dir().join("config.toml")
    }

    /// Get project config path
    /// Can be overridden with FERRY_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("FERRY_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".ferry/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<Option<RawFerryConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let raw = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
        Ok(Some(raw))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set).
    /// Lists are replaced, not appended.
    fn merge_raw(base: RawFerryConfig, overlay: RawFerryConfig) -> RawFerryConfig {
        RawFerryConfig {
            plugins: RawPluginsConfig {
                search_roots: overlay.plugins.search_roots.or(base.plugins.search_roots),
                include_host_dir: overlay
                    .plugins
                    .include_host_dir
                    .or(base.plugins.include_host_dir),
                extension: overlay.plugins.extension.or(base.plugins.extension),
                debounce_ms: overlay.plugins.debounce_ms.or(base.plugins.debounce_ms),
                data_dir: overlay.plugins.data_dir.or(base.plugins.data_dir),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawFerryConfig) -> FerryConfig {
        let defaults = PluginHostConfig::default();
        let plugins = raw.plugins;
        FerryConfig {
            plugins: PluginHostConfig {
                search_roots: plugins.search_roots.unwrap_or(defaults.search_roots),
                include_host_dir: plugins.include_host_dir.unwrap_or(defaults.include_host_dir),
                extension: plugins.extension.unwrap_or(defaults.extension),
                debounce_ms: plugins.debounce_ms.unwrap_or(defaults.debounce_ms),
                data_dir: plugins.data_dir.unwrap_or(defaults.data_dir),
            },
        }
    }
}
