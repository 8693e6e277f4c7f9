//! MigrationContext - what a plugin sees while migrating its data

use crate::error::PluginError;
use crate::services::ServiceProvider;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Passed to [`Plugin::migrate`](crate::Plugin::migrate).
///
/// Gives access to:
/// - the plugin's name (its module file stem) and module path
/// - a private data directory for schema or data files
/// - the plugin configuration read from `<stem>.toml` next to the module
/// - service resolution (plugin services first, then the host's)
/// - logging tagged with the plugin name
pub struct MigrationContext {
    plugin_name: String,
    module_path: PathBuf,
    data_dir: PathBuf,
    config: PluginConfig,
    services: Arc<dyn ServiceProvider>,
}

/// Plugin configuration - read-only key-value store backed by TOML
pub struct PluginConfig {
    values: HashMap<String, toml::Value>,
}

impl MigrationContext {
    /// Create a new migration context
    pub fn new(
        plugin_name: impl Into<String>,
        module_path: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        services: Arc<dyn ServiceProvider>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            module_path: module_path.into(),
            data_dir: data_dir.into(),
            config: PluginConfig::new(),
            services,
        }
    }

    /// Builder: attach a pre-loaded config
    pub fn with_config(mut self, config: PluginConfig) -> Self {
        self.config = config;
        self
    }

    /// The plugin's name
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Path of the module file the plugin was loaded from
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// Directory reserved for this plugin's data.
    ///
    /// The host does not create it; migrations that need it should.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Read a configuration value
    ///
    /// # Example
    /// ```ignore
    /// let schema: Option<u32> = ctx.config_get("schema_version");
    /// ```
    pub fn config_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config.get(key)
    }

    /// Resolve a service, checking the plugin's own services before the host's
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services.resolve::<T>()
    }

    /// Resolve a service or fail with [`PluginError::MissingService`]
    pub fn require<T: Any + Send + Sync>(&self) -> Result<Arc<T>, PluginError> {
        self.resolve::<T>()
            .ok_or_else(PluginError::missing_service::<T>)
    }

    /// The provider backing [`resolve`](Self::resolve)
    pub fn services(&self) -> &Arc<dyn ServiceProvider> {
        &self.services
    }

    // ─── Logging ─────────────────────────────────────────────────────

    /// Log an info message (automatically tagged with plugin name)
    pub fn log_info(&self, message: &str) {
        tracing::info!(plugin = %self.plugin_name, "{}", message);
    }

    /// Log a warning message
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(plugin = %self.plugin_name, "{}", message);
    }

    /// Log an error message
    pub fn log_error(&self, message: &str) {
        tracing::error!(plugin = %self.plugin_name, "{}", message);
    }

    /// Log a debug message
    pub fn log_debug(&self, message: &str) {
        tracing::debug!(plugin = %self.plugin_name, "{}", message);
    }
}

impl PluginConfig {
    /// Create a new empty config
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Load configuration from a TOML file
    ///
    /// A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let values: HashMap<String, toml::Value> =
            toml::from_str(&content).map_err(|e| PluginError::Config(e.to_string()))?;
        Ok(Self { values })
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values.get(key).and_then(|v| v.clone().try_into().ok())
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceCollection;
    use tempfile::TempDir;

    fn context_with(services: ServiceCollection) -> MigrationContext {
        MigrationContext::new(
            "audit",
            "/plugins/audit.so",
            "/data/audit",
            Arc::new(services),
        )
    }

    #[test]
    fn test_context_accessors() {
        let ctx = context_with(ServiceCollection::new());
        assert_eq!(ctx.plugin_name(), "audit");
        assert_eq!(ctx.module_path(), Path::new("/plugins/audit.so"));
        assert_eq!(ctx.data_dir(), Path::new("/data/audit"));
    }

    #[test]
    fn test_context_resolves_services() {
        let ctx = context_with(ServiceCollection::new().with(5u64));
        assert_eq!(*ctx.resolve::<u64>().unwrap(), 5);
        assert!(ctx.resolve::<String>().is_none());
    }

    #[test]
    fn test_require_missing_service_errors() {
        let ctx = context_with(ServiceCollection::new());
        let err = ctx.require::<String>().unwrap_err();
        assert!(matches!(err, PluginError::MissingService(_)));
    }

    #[test]
    fn test_context_reads_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.toml");
        std::fs::write(&path, "schema_version = 3\ntable = \"events\"\n").unwrap();
        let config = PluginConfig::load(&path).unwrap();

        let ctx = context_with(ServiceCollection::new()).with_config(config);
        assert_eq!(ctx.config_get::<i64>("schema_version"), Some(3));
        assert_eq!(ctx.config_get::<String>("table"), Some("events".to_string()));
        assert_eq!(ctx.config_get::<i64>("missing"), None);
    }

    #[test]
    fn test_config_wrong_type_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.toml");
        std::fs::write(&path, "table = \"events\"\n").unwrap();

        let config = PluginConfig::load(&path).unwrap();
        assert_eq!(config.get::<i64>("table"), None);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = PluginConfig::load(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert!(config.values.is_empty());
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let result = PluginConfig::load(&path);
        assert!(matches!(result, Err(PluginError::Config(_))));
    }
}
