//! Service catalogs.
//!
//! A [`ServicesCatalog`] maps service type names to the ordered providers
//! registered for them. Registration is append-only and safe under
//! arbitrary concurrent access; lookups return a snapshot and may or may not
//! observe concurrently registered entries.

use dashmap::DashMap;

use crate::descriptor::ModuleDescriptor;

/// One registered provider of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProvider {
    /// Name of the providing module
    pub module: String,
    /// Provider class name
    pub provider: String,
}

/// Append-only multimap from service type to providers.
#[derive(Debug, Default)]
pub struct ServicesCatalog {
    map: DashMap<String, Vec<ServiceProvider>>,
}

impl ServicesCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register all provides declarations of a module, preserving
    /// declaration order.
    pub fn register(&self, descriptor: &ModuleDescriptor) {
        for provides in descriptor.provides() {
            let mut entry = self.map.entry(provides.service().to_string()).or_default();
            for provider in provides.providers() {
                entry.push(ServiceProvider {
                    module: descriptor.name().to_string(),
                    provider: provider.clone(),
                });
            }
        }
    }

    /// Snapshot of the providers registered for a service type.
    pub fn find_services(&self, service: &str) -> Vec<ServiceProvider> {
        self.map
            .get(service)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Number of service types with at least one provider.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ModuleDescriptor;

    fn provider_module(name: &str, service: &str, providers: &[&str]) -> ModuleDescriptor {
        ModuleDescriptor::builder(name)
            .unwrap()
            .provides(service, providers.iter().map(|s| s.to_string()).collect())
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_find() {
        let catalog = ServicesCatalog::new();
        catalog.register(&provider_module(
            "plugin",
            "lib.spi.S",
            &["plugin.Impl", "plugin.Backup"],
        ));

        let found = catalog.find_services("lib.spi.S");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].module, "plugin");
        assert_eq!(found[0].provider, "plugin.Impl");
        assert_eq!(found[1].provider, "plugin.Backup");

        assert!(catalog.find_services("lib.spi.Other").is_empty());
    }

    #[test]
    fn test_append_preserves_earlier_entries() {
        let catalog = ServicesCatalog::new();
        catalog.register(&provider_module("one", "s.Api", &["one.Impl"]));
        catalog.register(&provider_module("two", "s.Api", &["two.Impl"]));

        let found = catalog.find_services("s.Api");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].module, "one");
        assert_eq!(found[1].module, "two");
    }

    #[test]
    fn test_concurrent_registration_loses_nothing() {
        use std::sync::Arc;

        let catalog = Arc::new(ServicesCatalog::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let catalog = Arc::clone(&catalog);
            handles.push(std::thread::spawn(move || {
                let name = format!("m{}", i);
                catalog.register(&provider_module(&name, "s.Api", &["p.Impl"]));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(catalog.find_services("s.Api").len(), 8);
    }
}
