//! Named service registry (spec §4.5: `context.registerService(name, impl)`).

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::PluginError;

/// A string-keyed table of opaque, type-erased capabilities one plugin
/// exposes for later-loaded plugins to retrieve by name. Shared by `Arc`
/// across every plugin in a [`crate::registry::PluginRegistry`]; immutable
/// after `onInit` finishes (spec §5: "immutable after startup except for
/// service registrations during `onInit`").
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named service. Rejects a name already in use.
    pub fn register<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) -> Result<(), PluginError> {
        let name = name.into();
        match self.services.entry(name.clone()) {
            Entry::Occupied(_) => Err(PluginError::DuplicateService { name }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(value));
                Ok(())
            }
        }
    }

    /// Look up a service by name, downcasting to `T`. Returns `None` if the
    /// name is unregistered or registered under a different type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let entry = self.services.get(name)?;
        Arc::clone(entry.value()).downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_get_round_trips() {
        let reg = ServiceRegistry::new();
        reg.register("cache", 42u32).unwrap();
        assert_eq!(*reg.get::<u32>("cache").unwrap(), 42);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let reg = ServiceRegistry::new();
        reg.register("cache", 1u32).unwrap();
        let err = reg.register("cache", 2u32).unwrap_err();
        assert!(matches!(err, PluginError::DuplicateService { .. }));
    }

    #[test]
    fn wrong_type_lookup_returns_none() {
        let reg = ServiceRegistry::new();
        reg.register("cache", 1u32).unwrap();
        assert!(reg.get::<String>("cache").is_none());
    }

    #[test]
    fn unknown_name_returns_none() {
        let reg = ServiceRegistry::new();
        assert!(reg.get::<u32>("missing").is_none());
    }
}
