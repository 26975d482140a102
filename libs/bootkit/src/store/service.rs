use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Entry, StoreError};

enum Slot {
    Instance(Entry),
    Function(Entry),
}

/// Untyped view of a stored service.
#[derive(Debug, Clone, Copy)]
pub enum ServiceRef<'a> {
    /// An `Arc<T>` registered with [`ServiceStore::set`].
    Instance(&'a Entry),
    /// A function value registered with [`ServiceStore::set_fn`].
    Function(&'a Entry),
}

impl<'a> ServiceRef<'a> {
    pub fn entry(&self) -> &'a Entry {
        match *self {
            ServiceRef::Instance(e) | ServiceRef::Function(e) => e,
        }
    }

    pub fn is_instance(&self) -> bool {
        matches!(self, ServiceRef::Instance(_))
    }
}

/// Process-wide store of initialized services, filled by initialization units.
///
/// Entries are either shared instances (`Arc<T>`, `T` may be a trait object)
/// or plain function values. Writing to an existing key replaces the entry.
#[derive(Default)]
pub struct ServiceStore {
    slots: HashMap<String, Slot>,
}

impl ServiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a shared instance. Returns `true` if an existing entry was replaced.
    pub fn set<T>(&mut self, key: impl Into<String>, instance: Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(key.into(), Slot::Instance(Entry::new(instance)))
    }

    /// Publish a function value (a `fn` pointer, or an `Arc<dyn Fn ..>`).
    pub fn set_fn<F>(&mut self, key: impl Into<String>, function: F) -> bool
    where
        F: Send + Sync + 'static,
    {
        self.insert(key.into(), Slot::Function(Entry::new(function)))
    }

    fn insert(&mut self, key: String, slot: Slot) -> bool {
        let ty = match &slot {
            Slot::Instance(e) | Slot::Function(e) => e.type_name(),
        };
        let replaced = self.slots.insert(key.clone(), slot).is_some();
        if replaced {
            tracing::warn!(key = %key, ty, "service re-registered; previous entry replaced");
        } else {
            tracing::debug!(key = %key, ty, "service registered");
        }
        replaced
    }

    /// Raw lookup; the caller narrows to the expected type.
    pub fn get_raw(&self, key: &str) -> Option<ServiceRef<'_>> {
        self.slots.get(key).map(|slot| match slot {
            Slot::Instance(e) => ServiceRef::Instance(e),
            Slot::Function(e) => ServiceRef::Function(e),
        })
    }

    /// Shared handle to an instance entry.
    pub fn get<T>(&self, key: &str) -> Result<Arc<T>, StoreError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entry = self.instance(key)?;
        entry
            .downcast_arc::<T>()
            .ok_or_else(|| entry.mismatch::<Arc<T>>(key))
    }

    /// Copy of a function entry.
    pub fn get_fn<F>(&self, key: &str) -> Result<F, StoreError>
    where
        F: Clone + Send + Sync + 'static,
    {
        match self.get_raw(key) {
            Some(ServiceRef::Function(entry)) => entry
                .downcast_ref::<F>()
                .cloned()
                .ok_or_else(|| entry.mismatch::<F>(key)),
            Some(ServiceRef::Instance(_)) => Err(StoreError::NotAFunction {
                key: key.to_string(),
            }),
            None => Err(not_found(key)),
        }
    }

    /// Independent copy of the pointee of an instance entry.
    ///
    /// Mutating the returned value is not visible through [`get`](Self::get).
    /// Function entries cannot be cloned this way.
    pub fn cloned<T>(&self, key: &str) -> Result<T, StoreError>
    where
        T: Clone + Any + Send + Sync,
    {
        self.get::<T>(key).map(|shared| T::clone(&shared))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn instance(&self, key: &str) -> Result<&Entry, StoreError> {
        match self.get_raw(key) {
            Some(ServiceRef::Instance(entry)) => Ok(entry),
            Some(ServiceRef::Function(_)) => Err(StoreError::NotAnInstance {
                key: key.to_string(),
            }),
            None => Err(not_found(key)),
        }
    }
}

fn not_found(key: &str) -> StoreError {
    StoreError::NotFound {
        key: key.to_string(),
    }
}

impl fmt::Debug for ServiceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ServiceStore").field("keys", &keys).finish()
    }
}
