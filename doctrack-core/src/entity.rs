//! Core traits and handle types for tracked entities.
//!
//! Entities are plain serde types. The mapping layer never asks them to carry persistence
//! metadata; instead every entity instance handed to a session is wrapped in a [`Tracked`]
//! handle that owns a surrogate [`EntityKey`]. The key is the entity's identity for the
//! change tracker and the shadow store: two field-equal entities have different keys.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    any::type_name,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Marker trait for types that can be mapped to documents.
///
/// This trait is automatically implemented for every type that satisfies its bounds, so
/// entities only need the usual serde derives.
///
/// # Example
///
/// ```ignore
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// pub struct AccountPlan {
///     pub id: String,
///     pub name: String,
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Entity for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Returns the unqualified name of `T`, without module path or generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);

    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

static NEXT_ENTITY_KEY: AtomicU64 = AtomicU64::new(1);

/// Surrogate identity assigned to an entity instance when it enters the mapping layer.
///
/// Keys are unique for the lifetime of the process and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(u64);

impl EntityKey {
    /// Allocates a fresh key.
    pub fn next() -> Self {
        EntityKey(NEXT_ENTITY_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value of the key.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A shared handle to an entity instance known to a session.
///
/// Cloning the handle clones the reference, not the entity: every clone observes the same
/// instance and carries the same [`EntityKey`]. Mutations go through [`Tracked::write`] and
/// must be declared to the session with `mark_modified` before committing.
pub struct Tracked<T> {
    key: EntityKey,
    inner: Arc<RwLock<T>>,
}

impl<T: Entity> Tracked<T> {
    pub(crate) fn new(entity: T) -> Self {
        Self {
            key: EntityKey::next(),
            inner: Arc::new(RwLock::new(entity)),
        }
    }
}

impl<T> Tracked<T> {
    /// Returns the identity key of the referenced instance.
    pub fn key(&self) -> EntityKey {
        self.key
    }

    /// Acquires shared read access to the entity.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Acquires exclusive write access to the entity.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Returns `true` when both handles reference the same instance.
    pub fn same_instance(&self, other: &Tracked<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> Tracked<T> {
    /// Returns a detached copy of the entity's current value.
    pub fn snapshot(&self) -> T {
        self.inner.read().clone()
    }
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("key", &self.key)
            .field("entity", &*self.inner.read())
            .finish()
    }
}
