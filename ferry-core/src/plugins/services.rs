//! ServiceRegistry - per-plugin services chained to the host's

use std::any::{Any, TypeId};
use std::sync::{Arc, PoisonError, RwLock};

use ferry_plugin_api::{ServiceCollection, ServiceInstance, ServiceProvider};

/// A service container with an optional fallback.
///
/// The host owns one root registry holding host-wide services. Every loaded
/// plugin gets its own registry populated from the services it declares and
/// chained to the root, so a plugin can override a host service while still
/// resolving host services it does not provide.
pub struct ServiceRegistry {
    scope: String,
    /// `None` once disposed
    services: RwLock<Option<ServiceCollection>>,
    parent: Option<Arc<ServiceRegistry>>,
}

impl ServiceRegistry {
    /// Create the host-wide registry
    pub fn host(services: ServiceCollection) -> Arc<Self> {
        Arc::new(Self {
            scope: "host".to_string(),
            services: RwLock::new(Some(services)),
            parent: None,
        })
    }

    /// Create a plugin registry chained to `parent`
    pub fn for_plugin(
        name: impl Into<String>,
        services: ServiceCollection,
        parent: Arc<ServiceRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            scope: name.into(),
            services: RwLock::new(Some(services)),
            parent: Some(parent),
        })
    }

    /// Scope name: `host` or the plugin name
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Resolve a service, own services first, then the parent chain
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve_any(TypeId::of::<T>())
            .and_then(|instance| instance.downcast::<T>().ok())
    }

    /// Whether this registry itself (not its parent) holds a service of type `T`
    pub fn provides<T: Any + Send + Sync>(&self) -> bool {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|services| services.contains::<T>())
    }

    /// Type names of the services this registry itself holds
    pub fn type_names(&self) -> Vec<&'static str> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(ServiceCollection::type_names)
            .unwrap_or_default()
    }

    /// Drop this registry's own services.
    ///
    /// Consumers still holding the registry fall through to the parent
    /// afterwards. Disposing twice is a no-op.
    pub fn dispose(&self) {
        let disposed = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(services) = disposed {
            tracing::debug!(scope = %self.scope, count = services.len(), "Service registry disposed");
        }
    }

    /// Whether [`dispose`](Self::dispose) has run
    pub fn is_disposed(&self) -> bool {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl ServiceProvider for ServiceRegistry {
    fn resolve_any(&self, type_id: TypeId) -> Option<ServiceInstance> {
        let own = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|services| services.resolve_any(type_id));

        own.or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.resolve_any(type_id))
        })
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("scope", &self.scope)
            .field("services", &self.type_names())
            .field("parent", &self.parent.as_ref().map(|p| p.scope()))
            .finish()
    }
}
