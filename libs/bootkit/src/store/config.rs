use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Entry, StoreError};

/// Process-wide store of decoded configuration objects.
///
/// Values go in as `Arc<T>`, so only pointer-shaped values can be registered;
/// a bare struct does not type-check:
///
/// ```compile_fail
/// #[derive(Default)]
/// struct Settings { port: u16 }
///
/// let mut store = bootkit::ConfigStore::new();
/// store.register("settings", Settings::default());
/// ```
///
/// Re-registering a key replaces the previous value (last write wins).
#[derive(Default)]
pub struct ConfigStore {
    entries: HashMap<String, Entry>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`. Returns `true` if an existing entry was replaced.
    pub fn register<T>(&mut self, key: impl Into<String>, value: Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = key.into();
        let replaced = self.entries.insert(key.clone(), Entry::new(value)).is_some();
        if replaced {
            tracing::warn!(key = %key, "configuration key re-registered; previous value replaced");
        } else {
            tracing::debug!(key = %key, ty = std::any::type_name::<T>(), "configuration registered");
        }
        replaced
    }

    /// Typed lookup; returns the same `Arc` that was registered.
    pub fn get<T>(&self, key: &str) -> Result<Arc<T>, StoreError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entry = self.get_raw(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        entry
            .downcast_arc::<T>()
            .ok_or_else(|| entry.mismatch::<Arc<T>>(key))
    }

    /// Untyped lookup; the caller downcasts.
    pub fn get_raw(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ConfigStore").field("keys", &keys).finish()
    }
}
