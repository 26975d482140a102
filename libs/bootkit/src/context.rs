use std::path::{Path, PathBuf};
use std::sync::Arc;

use bootkit_bootstrap::BootOptions;

use crate::store::{ConfigStore, ServiceStore, StoreError};

/// Everything an initialization unit can reach during bootstrap.
///
/// Owned by the [`Booter`](crate::Booter) and lent to one unit at a time, so
/// store writes never race.
#[derive(Debug)]
pub struct BootContext {
    options: BootOptions,
    root_dir: PathBuf,
    configs: ConfigStore,
    services: ServiceStore,
}

impl BootContext {
    pub fn new(options: BootOptions, root_dir: PathBuf, configs: ConfigStore) -> Self {
        Self {
            options,
            root_dir,
            configs,
            services: ServiceStore::new(),
        }
    }

    pub fn options(&self) -> &BootOptions {
        &self.options
    }

    /// Absolute root directory the configuration was loaded from.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn is_debug(&self) -> bool {
        self.options.debug
    }

    pub fn is_testing(&self) -> bool {
        self.options.testing
    }

    pub fn configs(&self) -> &ConfigStore {
        &self.configs
    }

    pub fn configs_mut(&mut self) -> &mut ConfigStore {
        &mut self.configs
    }

    pub fn services(&self) -> &ServiceStore {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut ServiceStore {
        &mut self.services
    }

    /// Shorthand for `configs().get::<T>(key)`.
    pub fn config<T>(&self, key: &str) -> Result<Arc<T>, StoreError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.configs.get(key)
    }

    /// Shorthand for `services().get::<T>(key)`.
    pub fn service<T>(&self, key: &str) -> Result<Arc<T>, StoreError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services.get(key)
    }

    pub(crate) fn freeze(self) -> Booted {
        Booted {
            options: self.options,
            root_dir: self.root_dir,
            configs: Arc::new(self.configs),
            services: Arc::new(self.services),
        }
    }
}

/// Result of a completed bootstrap: the frozen stores.
///
/// Stores are only reachable through `Arc` from here on, so they are read-only
/// for the rest of the process and can be shared with any task.
///
/// Publishing after bootstrap does not compile:
///
/// ```compile_fail
/// use std::sync::Arc;
///
/// fn publish_late(booted: &bootkit::Booted) {
///     booted.services().set("late", Arc::new(1_u32));
/// }
/// ```
///
/// Reading does:
///
/// ```
/// fn read(booted: &bootkit::Booted) -> bootkit::Result<u32> {
///     Ok(*booted.service::<u32>("count")?)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Booted {
    options: BootOptions,
    root_dir: PathBuf,
    configs: Arc<ConfigStore>,
    services: Arc<ServiceStore>,
}

impl Booted {
    pub fn options(&self) -> &BootOptions {
        &self.options
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn configs(&self) -> Arc<ConfigStore> {
        Arc::clone(&self.configs)
    }

    pub fn services(&self) -> Arc<ServiceStore> {
        Arc::clone(&self.services)
    }

    pub fn config<T>(&self, key: &str) -> Result<Arc<T>, StoreError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.configs.get(key)
    }

    pub fn service<T>(&self, key: &str) -> Result<Arc<T>, StoreError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services.get(key)
    }
}
