//! Service declarations and resolution
//!
//! A plugin declares the services it exposes as a [`ServiceCollection`].
//! The host wraps that collection in a registry chained to its own
//! host-wide services, and hands plugins a [`ServiceProvider`] to resolve
//! from. Services are keyed by their Rust type.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ferry_plugin_api::{ServiceCollection, ServiceProvider};
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! struct FixedClock;
//!
//! impl Clock for FixedClock {
//!     fn now(&self) -> u64 {
//!         42
//!     }
//! }
//!
//! // Trait objects are registered as `Arc<dyn Trait>` values.
//! let services = ServiceCollection::new().with(Arc::new(FixedClock) as Arc<dyn Clock>);
//!
//! let provider: &dyn ServiceProvider = &services;
//! let clock = provider.resolve::<Arc<dyn Clock>>().unwrap();
//! assert_eq!(clock.now(), 42);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased service instance
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Something services can be resolved from.
///
/// Implemented by [`ServiceCollection`] and by the host's chained
/// registries. Use [`resolve`](trait.ServiceProvider.html#method.resolve)
/// on `dyn ServiceProvider` for typed access.
pub trait ServiceProvider: Send + Sync {
    /// Look up a service by its type id
    fn resolve_any(&self, type_id: TypeId) -> Option<ServiceInstance>;
}

impl dyn ServiceProvider + '_ {
    /// Resolve a service of type `T`
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve_any(TypeId::of::<T>())
            .and_then(|instance| instance.downcast::<T>().ok())
    }
}

struct ServiceEntry {
    type_name: &'static str,
    instance: ServiceInstance,
}

/// A set of services keyed by type
#[derive(Default)]
pub struct ServiceCollection {
    entries: HashMap<TypeId, ServiceEntry>,
}

impl ServiceCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a service, replacing any previous one of the same type
    pub fn with<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.insert(service);
        self
    }

    /// Add a service, replacing any previous one of the same type
    pub fn insert<T: Any + Send + Sync>(&mut self, service: T) {
        self.insert_arc(Arc::new(service));
    }

    /// Add an already shared service
    pub fn insert_arc<T: Any + Send + Sync>(&mut self, service: Arc<T>) {
        self.entries.insert(
            TypeId::of::<T>(),
            ServiceEntry {
                type_name: std::any::type_name::<T>(),
                instance: service,
            },
        );
    }

    /// Get a service of type `T`
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.instance.clone().downcast::<T>().ok())
    }

    /// Whether a service of type `T` is present
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of services
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Type names of the contained services, sorted
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        names
    }
}

impl ServiceProvider for ServiceCollection {
    fn resolve_any(&self, type_id: TypeId) -> Option<ServiceInstance> {
        self.entries.get(&type_id).map(|entry| entry.instance.clone())
    }
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("services", &self.type_names())
            .finish()
    }
}
