//! Typed service registry
//!
//! A process-wide name → value map populated during module init and
//! consulted during wiring. Read-mostly after init: `seal` forbids further
//! registration so lookups never race with writes.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::error::RegistryError;

/// Registry of named services
///
/// Values are stored type-erased; retrieval is by name plus target type.
/// The usual value shape is `Arc<T>` or `Arc<dyn Trait>` so clones are
/// cheap handles, not copies.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>,
    sealed: AtomicBool,
}

impl ServiceRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a service under `name`
    ///
    /// Fails if the name is already bound or the registry is sealed.
    pub fn register<T>(&self, name: &str, service: T) -> Result<(), RegistryError>
    where
        T: Any + Send + Sync + Clone,
    {
        if self.sealed.load(Ordering::Acquire) {
            return Err(RegistryError::Sealed(name.to_string()));
        }

        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        if services.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        services.insert(name.to_string(), Box::new(service));
        Ok(())
    }

    /// Look up a service by name, expecting the stored value to be a `T`
    ///
    /// Returns `None` if the name is unbound or the stored value has a
    /// different type.
    #[must_use]
    pub fn get<T>(&self, name: &str) -> Option<T>
    where
        T: Any + Clone,
    {
        let services = self.services.read().unwrap_or_else(|e| e.into_inner());
        services.get(name)?.downcast_ref::<T>().cloned()
    }

    /// Check whether a name is bound
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let services = self.services.read().unwrap_or_else(|e| e.into_inner());
        services.contains_key(name)
    }

    /// Names of all bound services, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let services = self.services.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Forbid further registration
    ///
    /// Called by the application once all modules finished init.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Whether the registry is sealed
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
