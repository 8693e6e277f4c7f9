//! PluginDescriptor - the lifecycle state machine of one plugin instance

use std::fmt;
use std::sync::Arc;

use ferry_plugin_api::{MigrationContext, Plugin, PluginManifest};
use serde::Serialize;

use super::error::PluginHostError;
use super::services::ServiceRegistry;

/// Lifecycle state of a plugin descriptor
///
/// ```text
/// Loaded ─▶ Starting ─┬▶ StartFailed
///                     └▶ Started ─▶ Migrating ─┬▶ MigrationFailed
///                                              └▶ Running
/// Started | Running | MigrationFailed ─▶ Stopping ─▶ Stopped ─▶ Disposed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    /// Instantiated, hooks not yet called
    Loaded,
    /// `start` in progress
    Starting,
    /// `start` failed (terminal)
    StartFailed { message: String },
    /// `start` succeeded
    Started,
    /// `migrate` in progress
    Migrating,
    /// `migrate` failed (terminal)
    MigrationFailed { message: String },
    /// Fully up
    Running,
    /// `stop` in progress
    Stopping,
    /// Stopped, not yet disposed
    Stopped,
    /// Disposed, services released
    Disposed,
}

impl LifecycleState {
    /// Short name of the state
    pub fn label(&self) -> &'static str {
        match self {
            Self::Loaded => "Loaded",
            Self::Starting => "Starting",
            Self::StartFailed { .. } => "StartFailed",
            Self::Started => "Started",
            Self::Migrating => "Migrating",
            Self::MigrationFailed { .. } => "MigrationFailed",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Disposed => "Disposed",
        }
    }

    /// A hook is currently executing
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Starting | Self::Migrating | Self::Stopping)
    }

    /// A terminal failure state
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::StartFailed { .. } | Self::MigrationFailed { .. })
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One plugin instance and where it is in its lifecycle.
///
/// Lifecycle calls are validated against the current state; calling one in
/// the wrong state fails with [`PluginHostError::InvalidTransition`] without
/// touching the plugin. `stop` and `dispose` are idempotent.
pub struct PluginDescriptor {
    name: String,
    manifest: PluginManifest,
    state: LifecycleState,
    services: Arc<ServiceRegistry>,
    instance: Box<dyn Plugin>,
}

impl PluginDescriptor {
    /// Wrap a freshly instantiated plugin
    pub fn new(name: impl Into<String>, instance: Box<dyn Plugin>, services: Arc<ServiceRegistry>) -> Self {
        let manifest = instance.manifest();
        Self {
            name: name.into(),
            manifest,
            state: LifecycleState::Loaded,
            services,
            instance,
        }
    }

    /// Plugin name (module file stem)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Manifest reported by the plugin at instantiation
    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// Current lifecycle state
    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// The plugin's chained service registry
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Run the plugin's start hook
    pub async fn start(&mut self) -> Result<(), PluginHostError> {
        if self.state != LifecycleState::Loaded {
            return Err(self.invalid("Starting"));
        }

        self.state = LifecycleState::Starting;
        match self.instance.start().await {
            Ok(()) => {
                self.state = LifecycleState::Started;
                tracing::debug!(plugin = %self.name, "Plugin started");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.state = LifecycleState::StartFailed {
                    message: message.clone(),
                };
                Err(PluginHostError::InitializationFailed {
                    name: self.name.clone(),
                    message,
                })
            }
        }
    }

    /// Run the plugin's migration hook
    pub async fn migrate(&mut self, ctx: &MigrationContext) -> Result<(), PluginHostError> {
        if self.state != LifecycleState::Started {
            return Err(self.invalid("Migrating"));
        }

        self.state = LifecycleState::Migrating;
        match self.instance.migrate(ctx).await {
            Ok(()) => {
                self.state = LifecycleState::Running;
                tracing::debug!(plugin = %self.name, "Plugin migrated");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.state = LifecycleState::MigrationFailed {
                    message: message.clone(),
                };
                Err(PluginHostError::MigrationFailed {
                    name: self.name.clone(),
                    message,
                })
            }
        }
    }

    /// Run the plugin's stop hook.
    ///
    /// The descriptor ends up `Stopped` even if the hook fails; the failure
    /// is returned as [`PluginHostError::StopFailed`].
    pub async fn stop(&mut self) -> Result<(), PluginHostError> {
        match self.state {
            LifecycleState::Stopped | LifecycleState::Disposed => return Ok(()),
            LifecycleState::Started
            | LifecycleState::Running
            | LifecycleState::MigrationFailed { .. } => {}
            _ => return Err(self.invalid("Stopping")),
        }

        self.state = LifecycleState::Stopping;
        let result = self.instance.stop().await;
        self.state = LifecycleState::Stopped;

        result.map_err(|e| PluginHostError::StopFailed {
            name: self.name.clone(),
            message: e.to_string(),
        })
    }

    /// Run the plugin's dispose hook and dispose its service registry.
    ///
    /// Allowed once the plugin is not running: after `stop`, after a failed
    /// `start`, or before it was ever started.
    pub async fn dispose(&mut self) -> Result<(), PluginHostError> {
        match self.state {
            LifecycleState::Disposed => return Ok(()),
            LifecycleState::Loaded
            | LifecycleState::StartFailed { .. }
            | LifecycleState::MigrationFailed { .. }
            | LifecycleState::Stopped => {}
            _ => return Err(self.invalid("Disposed")),
        }

        self.instance.dispose().await;
        self.services.dispose();
        self.state = LifecycleState::Disposed;
        tracing::debug!(plugin = %self.name, "Plugin disposed");
        Ok(())
    }

    fn invalid(&self, to: &str) -> PluginHostError {
        PluginHostError::InvalidTransition {
            name: self.name.clone(),
            from: self.state.label().to_string(),
            to: to.to_string(),
        }
    }
}

impl Drop for PluginDescriptor {
    fn drop(&mut self) {
        if self.state != LifecycleState::Disposed {
            tracing::warn!(
                plugin = %self.name,
                state = %self.state,
                "Plugin dropped without being disposed"
            );
        }
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("version", &self.manifest.version)
            .field("state", &self.state)
            .finish()
    }
}
