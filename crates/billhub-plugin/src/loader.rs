//! Plugin loaders: compiled-in factories and (feature-gated) shared libraries.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use billhub_core::error::AppError;

use crate::traits::Plugin;

/// Identifies a plugin to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Plugin name.
    pub name: String,
    /// Shared library path, for loaders that need one.
    pub path: Option<PathBuf>,
}

impl PluginDescriptor {
    /// Descriptor for a compiled-in plugin.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    /// Descriptor for a plugin in a shared library.
    pub fn at_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
        }
    }
}

/// Produces plugin instances from descriptors.
pub trait PluginLoader: Send + Sync {
    /// Load the plugin `descriptor` names.
    fn load(&mut self, descriptor: &PluginDescriptor) -> Result<Arc<dyn Plugin>, AppError>;

    /// Descriptors this loader can load without further input.
    fn discover(&self) -> Result<Vec<PluginDescriptor>, AppError>;
}

type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Loads compiled-in plugins from registered factories.
#[derive(Default)]
pub struct StaticPluginLoader {
    factories: BTreeMap<String, PluginFactory>,
}

impl std::fmt::Debug for StaticPluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticPluginLoader")
            .field("plugins", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StaticPluginLoader {
    /// Creates a loader with no factories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`.
    pub fn with_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Instantiates every registered plugin, ordered by name.
    pub fn load_all(&mut self) -> Result<Vec<Arc<dyn Plugin>>, AppError> {
        self.discover()?
            .iter()
            .map(|d| self.load(d))
            .collect()
    }
}

impl PluginLoader for StaticPluginLoader {
    fn load(&mut self, descriptor: &PluginDescriptor) -> Result<Arc<dyn Plugin>, AppError> {
        let factory = self.factories.get(&descriptor.name).ok_or_else(|| {
            AppError::not_found(format!("No compiled-in plugin named '{}'", descriptor.name))
        })?;
        Ok(factory())
    }

    fn discover(&self) -> Result<Vec<PluginDescriptor>, AppError> {
        Ok(self
            .factories
            .keys()
            .map(|name| PluginDescriptor::named(name.clone()))
            .collect())
    }
}

#[cfg(feature = "dynamic")]
pub use dynamic_loader::{CREATE_PLUGIN_SYMBOL, CreatePluginFn, DynamicPluginLoader};

#[cfg(feature = "dynamic")]
mod dynamic_loader {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use tracing::info;

    use billhub_core::error::AppError;

    use super::{PluginDescriptor, PluginLoader};
    use crate::traits::Plugin;

    /// Symbol every plugin library must export.
    pub const CREATE_PLUGIN_SYMBOL: &[u8] = b"create_plugin";

    /// Signature of the exported constructor.
    ///
    /// The library returns `Box::into_raw(Box::new(Box::new(plugin) as Box<dyn Plugin>))`
    /// and must be built with the same compiler and crate versions as the host.
    pub type CreatePluginFn = unsafe extern "C" fn() -> *mut Box<dyn Plugin>;

    /// Loads plugins from shared libraries (.so / .dll / .dylib) in one directory.
    pub struct DynamicPluginLoader {
        directory: PathBuf,
        /// Loaded libraries, kept alive for as long as their plugins may run.
        libraries: Vec<libloading::Library>,
    }

    impl std::fmt::Debug for DynamicPluginLoader {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("DynamicPluginLoader")
                .field("directory", &self.directory)
                .field("loaded_count", &self.libraries.len())
                .finish()
        }
    }

    impl DynamicPluginLoader {
        /// Creates a loader for libraries under `directory`.
        pub fn new(directory: impl Into<PathBuf>) -> Self {
            Self {
                directory: directory.into(),
                libraries: Vec::new(),
            }
        }

        /// Loads a plugin from the given shared library path.
        ///
        /// # Safety
        /// This runs arbitrary code from the library. Only load trusted plugins.
        pub unsafe fn load_from_path(&mut self, path: &Path) -> Result<Arc<dyn Plugin>, AppError> {
            let lib = unsafe { libloading::Library::new(path) }.map_err(|e| {
                AppError::internal(format!(
                    "Failed to load plugin library '{}': {}",
                    path.display(),
                    e
                ))
            })?;

            let plugin = {
                let create: libloading::Symbol<CreatePluginFn> =
                    unsafe { lib.get(CREATE_PLUGIN_SYMBOL) }.map_err(|e| {
                        AppError::internal(format!(
                            "Plugin '{}' missing 'create_plugin' symbol: {}",
                            path.display(),
                            e
                        ))
                    })?;
                let raw = unsafe { create() };
                if raw.is_null() {
                    return Err(AppError::internal(format!(
                        "Plugin '{}' returned a null plugin",
                        path.display()
                    )));
                }
                let boxed: Box<Box<dyn Plugin>> = unsafe { Box::from_raw(raw) };
                Arc::<dyn Plugin>::from(*boxed)
            };

            info!(path = %path.display(), "Dynamic plugin loaded");
            self.libraries.push(lib);
            Ok(plugin)
        }

        fn library_path(&self, name: &str) -> PathBuf {
            self.directory.join(libloading::library_filename(name))
        }
    }

    impl PluginLoader for DynamicPluginLoader {
        fn load(&mut self, descriptor: &PluginDescriptor) -> Result<Arc<dyn Plugin>, AppError> {
            let path = descriptor
                .path
                .clone()
                .unwrap_or_else(|| self.library_path(&descriptor.name));
            // SAFETY: libraries come from the operator-configured plugin directory.
            unsafe { self.load_from_path(&path) }
        }

        fn discover(&self) -> Result<Vec<PluginDescriptor>, AppError> {
            let entries = match std::fs::read_dir(&self.directory) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };

            let suffix = std::env::consts::DLL_SUFFIX;
            let prefix = std::env::consts::DLL_PREFIX;
            let mut found = Vec::new();
            for entry in entries {
                let path = entry?.path();
                let Some(file) = path.file_name().and_then(|f| f.to_str()) else {
                    continue;
                };
                if let Some(stem) = file.strip_suffix(suffix) {
                    let name = stem.strip_prefix(prefix).unwrap_or(stem).replace('_', "-");
                    found.push(PluginDescriptor::at_path(name, path.clone()));
                }
            }
            found.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(found)
        }
    }
}
