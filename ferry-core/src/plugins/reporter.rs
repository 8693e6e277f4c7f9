//! Error reporting for operations nobody awaits

use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;

use super::error::PluginHostError;

/// Which host operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Discovery,
    Load,
    Unload,
    Reload,
    Watch,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovery => "discovery",
            Self::Load => "load",
            Self::Unload => "unload",
            Self::Reload => "reload",
            Self::Watch => "watch",
        })
    }
}

/// A failed host operation
#[derive(Debug)]
pub struct PluginFailure {
    pub operation: Operation,
    /// Plugin the operation concerned, when known
    pub name: Option<String>,
    /// Module path the operation concerned, when known
    pub path: Option<PathBuf>,
    pub error: PluginHostError,
}

impl PluginFailure {
    pub fn new(operation: Operation, error: PluginHostError) -> Self {
        Self {
            operation,
            name: error.plugin_name().map(str::to_string),
            path: None,
            error,
        }
    }

    /// Builder: set the plugin name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: set the module path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.operation)?;
        if let Some(name) = &self.name {
            write!(f, " for '{name}'")?;
        }
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Receives failures from event-driven operations.
///
/// Never called for a module that simply is not a plugin.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, failure: PluginFailure);
}

/// Logs failures through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, failure: PluginFailure) {
        tracing::error!(
            operation = %failure.operation,
            plugin = failure.name.as_deref().unwrap_or("-"),
            path = ?failure.path,
            error = %failure.error,
            "Plugin operation failed"
        );
    }
}

/// Forwards failures into a channel
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<PluginFailure>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PluginFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ErrorReporter for ChannelReporter {
    fn report(&self, failure: PluginFailure) {
        if let Err(mpsc::error::SendError(failure)) = self.tx.send(failure) {
            TracingReporter.report(failure);
        }
    }
}
