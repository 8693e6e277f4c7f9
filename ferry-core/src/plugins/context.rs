//! LoadContext - the isolation boundary around one loaded plugin

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use libloading::Library;
use uuid::Uuid;

/// Resources backing one loaded plugin module.
///
/// Owned by the plugin's table entry. Releasing it unloads the shared
/// library, so it must only happen after the plugin instance is gone.
pub struct LoadContext {
    name: String,
    module_path: PathBuf,
    generation: Uuid,
    loaded_at: DateTime<Utc>,
    library: Option<Library>,
}

impl LoadContext {
    /// Create a context for a module, holding its library if it has one
    pub fn new(name: impl Into<String>, module_path: impl Into<PathBuf>, library: Option<Library>) -> Self {
        Self {
            name: name.into(),
            module_path: module_path.into(),
            generation: Uuid::now_v7(),
            loaded_at: Utc::now(),
            library,
        }
    }

    /// Plugin name this context belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module file the context was created from
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// Unique id of this load; a reload gets a new one
    pub fn generation(&self) -> Uuid {
        self.generation
    }

    /// When the module was loaded
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Whether a shared library is held
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }

    /// Release the context, unloading the library if there is one
    pub fn release(mut self) {
        if let Some(library) = self.library.take()
            && let Err(e) = library.close()
        {
            tracing::warn!(plugin = %self.name, error = %e, "Failed to close plugin library");
        }
        tracing::debug!(
            plugin = %self.name,
            generation = %self.generation,
            "Load context released"
        );
    }
}

impl std::fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContext")
            .field("name", &self.name)
            .field("module_path", &self.module_path)
            .field("generation", &self.generation)
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}
