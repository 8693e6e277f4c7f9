//! Error types for plugin authors

use thiserror::Error;

/// Errors that plugin lifecycle hooks can return
#[derive(Error, Debug)]
pub enum PluginError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema or data migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// A service the plugin needs could not be resolved
    #[error("Missing service: {0}")]
    MissingService(&'static str),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),
}

impl PluginError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a migration error
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration(message.into())
    }

    /// Error for a service of type `T` that is neither provided by the
    /// plugin nor by the host
    pub fn missing_service<T: ?Sized>() -> Self {
        Self::MissingService(std::any::type_name::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = PluginError::Config("missing key".to_string());
        assert_eq!(config_err.to_string(), "Configuration error: missing key");

        let migration_err = PluginError::Migration("table exists".to_string());
        assert_eq!(migration_err.to_string(), "Migration error: table exists");

        let custom_err = PluginError::Custom("something happened".to_string());
        assert_eq!(custom_err.to_string(), "something happened");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let plugin_err: PluginError = io_err.into();

        assert!(matches!(plugin_err, PluginError::Io(_)));
        assert!(plugin_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(PluginError::custom("test"), PluginError::Custom(_)));
        assert!(matches!(PluginError::config("bad"), PluginError::Config(_)));
        assert!(matches!(
            PluginError::migration("v2"),
            PluginError::Migration(_)
        ));
    }

    #[test]
    fn test_missing_service_names_the_type() {
        let err = PluginError::missing_service::<String>();
        assert!(err.to_string().contains("String"));
    }
}
