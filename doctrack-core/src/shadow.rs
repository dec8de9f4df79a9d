//! Out-of-band storage for values that are persisted with an entity but are not fields of it.
//!
//! The shadow store holds, per [`EntityKey`], a small map of named JSON values: the
//! optimistic-concurrency token, the server timestamp, and any shadow properties declared in
//! the model. It is shared by all sessions of a database. Each key is owned by the session
//! that tracks the entity; the store guarantees per-key atomicity only.

use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value;
use std::collections::HashMap;

use crate::{
    entity::EntityKey,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Shadow values of a single entity, keyed by wire name.
pub type ShadowValues = HashMap<String, Value>;

/// Thread-safe side table of shadow values, sharded by entity key.
#[derive(Debug, Default)]
pub struct ShadowStore {
    values: DashMap<EntityKey, ShadowValues>,
}

impl ShadowStore {
    /// Creates an empty shadow store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a shadow value, creating the entity's value set when needed.
    pub fn set(&self, key: EntityKey, name: &str, value: Value) {
        self.values
            .entry(key)
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Reads a shadow value. Unknown entities and unknown names both yield `None`.
    pub fn get(&self, key: EntityKey, name: &str) -> Option<Value> {
        self.values
            .get(&key)
            .and_then(|values| values.get(name).cloned())
    }

    /// Removes and returns every shadow value of an entity.
    pub fn remove_all(&self, key: EntityKey) -> Option<ShadowValues> {
        self.values
            .remove(&key)
            .map(|(_, values)| values)
    }

    /// Hands a freshly collected value set to the store.
    ///
    /// The key must not own values yet. An existing value set means the entity was already
    /// materialized or tracked, which is a lifecycle bug; the store keeps the existing values
    /// and reports a tracking-state error.
    pub fn adopt_all(&self, key: EntityKey, values: ShadowValues) -> DocumentStoreResult<()> {
        match self.values.entry(key) {
            Entry::Occupied(_) => Err(DocumentStoreError::TrackingState(format!(
                "entity {key} already owns shadow values"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(values);
                Ok(())
            }
        }
    }

    /// Returns `true` when the entity owns a value set.
    pub fn contains(&self, key: EntityKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Number of entities with shadow values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no entity owns shadow values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops every value set.
    pub fn clear(&self) {
        self.values.clear();
    }
}
