//! Module inspection - turning a module path into a plugin factory

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use ferry_plugin_api::{API_VERSION, Plugin};
use libloading::Library;

use super::discovery::plugin_name;
use super::error::PluginHostError;

/// Produces a fresh plugin entry object.
///
/// Returning `None` means the module does not provide a plugin after all,
/// which the host treats as a skip rather than an error.
pub type PluginFactory = Arc<dyn Fn() -> Option<Box<dyn Plugin>> + Send + Sync>;

/// What an inspector found in a module
#[derive(Clone)]
pub struct CapabilityDescriptor {
    /// Human-readable identity of the entry type
    pub entry_type: String,
    /// API version the module was built against
    pub api_version: u32,
    factory: PluginFactory,
}

impl CapabilityDescriptor {
    /// Create a descriptor for the current API version
    pub fn new(entry_type: impl Into<String>, factory: PluginFactory) -> Self {
        Self {
            entry_type: entry_type.into(),
            api_version: API_VERSION,
            factory,
        }
    }

    /// Builder: override the reported API version
    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }

    /// Create the plugin entry object.
    ///
    /// For dynamic modules this calls into the library, so it is only
    /// valid while the library returned alongside the descriptor is alive.
    pub fn instantiate(&self) -> Option<Box<dyn Plugin>> {
        (self.factory)()
    }
}

impl std::fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("entry_type", &self.entry_type)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

/// A module that provides a plugin
pub struct InspectedModule {
    /// How to instantiate the plugin
    pub descriptor: CapabilityDescriptor,
    /// Library handle backing the descriptor, if the module was loaded from
    /// a shared library. The host keeps it in the plugin's load context.
    pub library: Option<Library>,
}

/// Reads modules off disk and describes the plugin they contain.
///
/// Implementations must not keep references into a module once `release`
/// has been called for its name.
pub trait ModuleInspector: Send + Sync {
    /// Describe the plugin in the module at `path`.
    ///
    /// `Ok(None)` means the file is not a plugin.
    fn inspect(&self, path: &Path) -> Result<Option<InspectedModule>, PluginHostError>;

    /// Called once the load context for `name` has been released
    fn release(&self, _name: &str) {}
}

/// Inspector for plugins compiled into the host.
///
/// Maps a module file stem to a factory. A module whose stem has no
/// registered factory is not a plugin.
#[derive(Default)]
pub struct BuiltinInspector {
    factories: RwLock<HashMap<String, CapabilityDescriptor>>,
}

impl BuiltinInspector {
    /// Create an inspector with no registered plugins
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for modules named `name`
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Option<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        let name = name.into();
        let descriptor = CapabilityDescriptor::new(format!("builtin:{name}"), Arc::new(factory));
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, descriptor);
    }

    /// Register a plugin type constructed with `Default`
    pub fn register_default<P>(&self, name: impl Into<String>)
    where
        P: Plugin + Default + 'static,
    {
        self.register(name, || Some(Box::new(P::default()) as Box<dyn Plugin>));
    }

    /// Remove a registration
    pub fn unregister(&self, name: &str) -> bool {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }
}

impl ModuleInspector for BuiltinInspector {
    fn inspect(&self, path: &Path) -> Result<Option<InspectedModule>, PluginHostError> {
        let name = plugin_name(path).ok_or_else(|| PluginHostError::InvalidModulePath {
            path: path.to_path_buf(),
        })?;

        let descriptor = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned();

        Ok(descriptor.map(|descriptor| InspectedModule {
            descriptor,
            library: None,
        }))
    }
}
