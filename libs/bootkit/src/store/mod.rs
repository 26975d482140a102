//! Keyed, write-once-then-read-only stores filled during bootstrap.
//!
//! Both stores are mutated only through `&mut` while the [`Booter`](crate::Booter)
//! runs its units on a single task. Afterwards they are handed out behind
//! `Arc`, so nothing can write to them while lifecycle tasks read concurrently.

mod config;
mod service;

pub use config::ConfigStore;
pub use service::{ServiceRef, ServiceStore};

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// Lookup errors shared by both stores.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no entry registered under key '{key}'")]
    NotFound { key: String },
    #[error("entry '{key}' holds {actual}, not {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("entry '{key}' is a function value, not an instance")]
    NotAnInstance { key: String },
    #[error("entry '{key}' is an instance, not a function value")]
    NotAFunction { key: String },
}

/// A type-erased stored value together with the name of its concrete type.
pub struct Entry {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Entry {
    pub(crate) fn new<V: Any + Send + Sync>(value: V) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<V>(),
        }
    }

    /// Name of the stored type, e.g. `alloc::sync::Arc<my_app::DbPool>`.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the stored value as exactly `V`.
    pub fn downcast_ref<V: Any>(&self) -> Option<&V> {
        self.value.downcast_ref::<V>()
    }

    /// Clone out the stored pointer if it is an `Arc<T>`.
    pub fn downcast_arc<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.downcast_ref::<Arc<T>>().cloned()
    }

    pub(crate) fn mismatch<V: ?Sized>(&self, key: &str) -> StoreError {
        StoreError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<V>(),
            actual: self.type_name,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}
