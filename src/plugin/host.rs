//! Hook argument stores.
//!
//! Cross-component wiring is explicit constructor/parameter injection
//! resolved once at process start; these stores are the narrow surfaces the
//! plugin lifecycle hooks are handed, not an ambient service locator.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::output::Output;
use crate::registry::CommandRegistry;

/// Named external dependencies shared with plugins.
#[derive(Default)]
pub struct DependencyStore {
    deps: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl DependencyStore {
    pub fn register<T: Any + Send + Sync>(&mut self, name: &str, dep: T) {
        self.deps.insert(name.to_string(), Arc::new(dep));
    }

    /// Resolve a dependency by name, downcast to its concrete type.
    #[must_use]
    pub fn resolve<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.deps.get(name).and_then(|dep| Arc::clone(dep).downcast().ok())
    }
}

/// Namespace prefix to asset-root mapping.
#[derive(Default)]
pub struct NamespaceRegistry {
    namespaces: BTreeMap<String, PathBuf>,
}

impl NamespaceRegistry {
    pub fn register(&mut self, prefix: &str, root: PathBuf) {
        self.namespaces.insert(prefix.to_string(), root);
    }

    /// Resolve an asset name to the root of its longest matching namespace.
    #[must_use]
    pub fn resolve(&self, asset: &str) -> Option<&Path> {
        self.namespaces
            .iter()
            .filter(|(prefix, _)| asset.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, root)| root.as_path())
    }
}

/// Type-keyed singleton services shared with plugins.
#[derive(Default)]
pub struct ServiceContainer {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceContainer {
    pub fn singleton<T: Any + Send + Sync>(&mut self, service: T) {
        self.services.insert(TypeId::of::<T>(), Arc::new(service));
    }

    #[must_use]
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|svc| Arc::clone(svc).downcast().ok())
    }
}

/// The bundle of stores a plugin's lifecycle hooks act on.
pub struct Host {
    pub dependencies: DependencyStore,
    pub namespaces: NamespaceRegistry,
    pub services: ServiceContainer,
    pub commands: CommandRegistry,
}

impl Host {
    #[must_use]
    pub fn new(out: Output) -> Self {
        Self {
            dependencies: DependencyStore::default(),
            namespaces: NamespaceRegistry::default(),
            services: ServiceContainer::default(),
            commands: CommandRegistry::new(out),
        }
    }
}
