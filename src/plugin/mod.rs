//! Plugin loading and lifecycle.
//!
//! A plugin is an independently loadable unit contributing commands and
//! services to the CLI. Its behavior is a fixed interface of four *optional*
//! lifecycle hooks; only the hooks a plugin populates are invoked, in a
//! fixed order. Loading is fatal on failure: the CLI refuses to start with a
//! broken plugin rather than running with part of its command surface.

pub mod globals;
pub mod host;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use crate::registry::CommandRegistry;

pub use host::{DependencyStore, Host, NamespaceRegistry, ServiceContainer};

/// Errors raised while loading a plugin. All of them abort startup.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("failed to read plugin metadata at {path}: {source}")]
    MetadataIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse plugin metadata at {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no plugin entry registered for package '{name}' at {path}")]
    EntryNotFound { name: String, path: PathBuf },
    #[error("plugin '{plugin}' failed during {hook}: {source}")]
    Hook {
        plugin: String,
        hook: &'static str,
        #[source]
        source: HookError,
    },
}

/// Arbitrary failure from inside a lifecycle hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;
pub type HookResult = Result<(), HookError>;

pub type DependencyHook =
    Box<dyn for<'a> Fn(&'a mut DependencyStore) -> BoxFuture<'a, HookResult> + Send + Sync>;
pub type NamespaceHook =
    Box<dyn for<'a> Fn(&'a mut NamespaceRegistry) -> BoxFuture<'a, HookResult> + Send + Sync>;
pub type ServiceHook =
    Box<dyn for<'a> Fn(&'a mut ServiceContainer) -> BoxFuture<'a, HookResult> + Send + Sync>;
pub type CommandHook = Box<
    dyn for<'a> Fn(&'a mut CommandRegistry, Arc<PluginDescriptor>) -> BoxFuture<'a, HookResult>
        + Send
        + Sync,
>;

/// A plugin's behavior: its identity plus the lifecycle hooks it defines.
/// Absence of a hook is not an error.
pub struct Plugin {
    pub name: String,
    pub description: String,
    pub init_dependencies: Option<DependencyHook>,
    pub init_namespaces: Option<NamespaceHook>,
    pub init_services: Option<ServiceHook>,
    pub init_commands: Option<CommandHook>,
}

impl Plugin {
    #[must_use]
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            init_dependencies: None,
            init_namespaces: None,
            init_services: None,
            init_commands: None,
        }
    }

    #[must_use]
    pub fn on_init_dependencies<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut DependencyStore) -> BoxFuture<'a, HookResult>
            + Send
            + Sync
            + 'static,
    {
        self.init_dependencies = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_init_namespaces<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut NamespaceRegistry) -> BoxFuture<'a, HookResult>
            + Send
            + Sync
            + 'static,
    {
        self.init_namespaces = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_init_services<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut ServiceContainer) -> BoxFuture<'a, HookResult>
            + Send
            + Sync
            + 'static,
    {
        self.init_services = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_init_commands<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut CommandRegistry, Arc<PluginDescriptor>) -> BoxFuture<'a, HookResult>
            + Send
            + Sync
            + 'static,
    {
        self.init_commands = Some(Box::new(hook));
        self
    }
}

/// Immutable identity of a loaded plugin. `package_name` and `version` come
/// from the plugin's own package metadata at load time.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub description: String,
    pub package_name: String,
    pub version: String,
}

/// The plugin's own `package.json`.
#[derive(Debug, Deserialize)]
struct PluginPackage {
    name: String,
    version: String,
}

impl PluginPackage {
    fn read(path: &Path) -> Result<Self, PluginError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PluginError::MetadataIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| PluginError::MetadataParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A factory producing a plugin's behavior, the compiled-in stand-in for
/// loading a plugin entry module off disk.
pub type PluginFactory = Box<dyn Fn() -> Plugin + Send + Sync>;

/// Loads plugins and drives their lifecycle hooks.
///
/// The manager holds a table of available plugin entries keyed by package
/// name. It does not deduplicate: loading the same plugin twice registers
/// its commands twice (the registry flags the resulting slug collisions).
#[derive(Default)]
pub struct PluginManager {
    entries: HashMap<String, PluginFactory>,
    loaded: Vec<Arc<PluginDescriptor>>,
}

impl PluginManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a plugin entry available under its package name.
    pub fn register_entry<F>(&mut self, package_name: &str, factory: F)
    where
        F: Fn() -> Plugin + Send + Sync + 'static,
    {
        self.entries.insert(package_name.to_string(), Box::new(factory));
    }

    #[must_use]
    pub fn has_entry(&self, package_name: &str) -> bool {
        self.entries.contains_key(package_name)
    }

    /// Descriptors of every loaded plugin, in load order.
    #[must_use]
    pub fn loaded(&self) -> &[Arc<PluginDescriptor>] {
        &self.loaded
    }

    /// Load a compiled-in plugin that ships with the CLI itself. Its package
    /// metadata is the CLI's own.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::Hook` if one of its lifecycle hooks fails.
    pub async fn load_builtin(
        &mut self,
        plugin: Plugin,
        host: &mut Host,
    ) -> Result<(), PluginError> {
        let descriptor = Arc::new(PluginDescriptor {
            name: plugin.name.clone(),
            description: plugin.description.clone(),
            package_name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
        Self::run_lifecycle(&plugin, &descriptor, host).await?;
        self.loaded.push(descriptor);
        Ok(())
    }

    /// Load the plugin installed at `path`: read its package metadata,
    /// resolve its entry, and run its lifecycle hooks.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to startup: missing or malformed metadata,
    /// an unregistered entry, or a failing lifecycle hook.
    pub async fn load_plugin_at(
        &mut self,
        path: &Path,
        host: &mut Host,
    ) -> Result<(), PluginError> {
        debug!("Loading plugin at {}", path.display());

        let metadata = PluginPackage::read(&path.join("package.json"))?;
        let factory = self
            .entries
            .get(metadata.name.as_str())
            .ok_or_else(|| PluginError::EntryNotFound {
                name: metadata.name.clone(),
                path: path.to_path_buf(),
            })?;

        let plugin = factory();
        let descriptor = Arc::new(PluginDescriptor {
            name: plugin.name.clone(),
            description: plugin.description.clone(),
            package_name: metadata.name,
            version: metadata.version,
        });

        Self::run_lifecycle(&plugin, &descriptor, host).await?;

        info!(
            "Loaded plugin '{}' ({}:{})",
            descriptor.name, descriptor.package_name, descriptor.version
        );
        self.loaded.push(descriptor);
        Ok(())
    }

    /// Load discovered plugin directories, skipping the ones with no
    /// registered entry. Load failures of known plugins still propagate.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load_plugin_at`] for each known plugin.
    pub async fn load_discovered(
        &mut self,
        paths: &[PathBuf],
        host: &mut Host,
    ) -> Result<(), PluginError> {
        for path in paths {
            match PluginPackage::read(&path.join("package.json")) {
                Ok(metadata) if self.has_entry(&metadata.name) => {
                    self.load_plugin_at(path, host).await?;
                }
                Ok(metadata) => {
                    debug!(
                        "Skipping discovered plugin '{}' at {}: no entry registered",
                        metadata.name,
                        path.display()
                    );
                }
                Err(e) => {
                    debug!("Skipping discovered directory {}: {e}", path.display());
                }
            }
        }
        Ok(())
    }

    /// Invoke the hooks the plugin defines, awaited sequentially in the
    /// fixed order: dependencies, namespaces, services, commands. A hook
    /// failure aborts the remaining hooks for this plugin.
    async fn run_lifecycle(
        plugin: &Plugin,
        descriptor: &Arc<PluginDescriptor>,
        host: &mut Host,
    ) -> Result<(), PluginError> {
        let hook_error = |hook: &'static str| {
            let plugin = descriptor.name.clone();
            move |source| PluginError::Hook {
                plugin,
                hook,
                source,
            }
        };

        if let Some(hook) = &plugin.init_dependencies {
            hook(&mut host.dependencies)
                .await
                .map_err(hook_error("init_dependencies"))?;
        }
        if let Some(hook) = &plugin.init_namespaces {
            hook(&mut host.namespaces)
                .await
                .map_err(hook_error("init_namespaces"))?;
        }
        if let Some(hook) = &plugin.init_services {
            hook(&mut host.services)
                .await
                .map_err(hook_error("init_services"))?;
        }
        if let Some(hook) = &plugin.init_commands {
            hook(&mut host.commands, Arc::clone(descriptor))
                .await
                .map_err(hook_error("init_commands"))?;
        }
        Ok(())
    }
}
