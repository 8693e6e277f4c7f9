//! Shared library inspector backed by `libloading`

use std::path::Path;
use std::sync::Arc;

use ferry_plugin_api::{API_VERSION, API_VERSION_SYMBOL, CREATE_SYMBOL, Plugin};
use libloading::Library;

use super::error::PluginHostError;
use super::inspector::{CapabilityDescriptor, InspectedModule, ModuleInspector, PluginFactory};

/// Signature of `_ferry_plugin_create` as generated by `export_plugin!`
#[allow(improper_ctypes_definitions)]
type CreatePluginFn = extern "C" fn() -> *mut dyn Plugin;

/// Signature of `_ferry_plugin_api_version`
type ApiVersionFn = extern "C" fn() -> u32;

/// Loads plugin modules from shared libraries (.so / .dylib / .dll).
///
/// A library that does not export the ferry entry points is not a plugin.
#[derive(Debug, Default)]
pub struct DynamicLibraryInspector;

impl DynamicLibraryInspector {
    /// Create a new inspector
    pub fn new() -> Self {
        Self
    }
}

impl ModuleInspector for DynamicLibraryInspector {
    fn inspect(&self, path: &Path) -> Result<Option<InspectedModule>, PluginHostError> {
        // SAFETY: Loading a library runs its initialisers. Only modules found
        // under the configured plugin roots reach this point.
        let library = unsafe { Library::new(path)? };

        // SAFETY: The symbol type matches what `export_plugin!` generates.
        let found = match unsafe { library.get::<ApiVersionFn>(API_VERSION_SYMBOL) } {
            Ok(version_fn) => version_fn(),
            Err(_) => {
                tracing::debug!(path = %path.display(), "No API version symbol, not a plugin");
                return Ok(None);
            }
        };

        if found != API_VERSION {
            return Err(PluginHostError::ApiVersionMismatch {
                expected: API_VERSION,
                found,
            });
        }

        // SAFETY: As above. The fn pointer is copied out of the symbol and is
        // only called while `library` is alive, which the host guarantees by
        // storing the library in the plugin's load context.
        let create: CreatePluginFn = match unsafe { library.get::<CreatePluginFn>(CREATE_SYMBOL) } {
            Ok(symbol) => *symbol,
            Err(_) => {
                tracing::debug!(path = %path.display(), "No create symbol, not a plugin");
                return Ok(None);
            }
        };

        let factory: PluginFactory = Arc::new(move || {
            let raw = create();
            if raw.is_null() {
                None
            } else {
                // SAFETY: The pointer came from `Box::into_raw` in the plugin.
                Some(unsafe { Box::from_raw(raw) })
            }
        });

        let entry_type = path
            .file_name()
            .map(|name| format!("dylib:{}", name.to_string_lossy()))
            .unwrap_or_else(|| "dylib".to_string());

        tracing::debug!(path = %path.display(), "Plugin library inspected");

        Ok(Some(InspectedModule {
            descriptor: CapabilityDescriptor::new(entry_type, factory).with_api_version(found),
            library: Some(library),
        }))
    }
}
