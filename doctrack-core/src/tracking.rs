//! Identity map of tracked entities and their lifecycle state.
//!
//! Every entity a session knows about has exactly one [`EntityEntry`] in the session's
//! [`ChangeTracker`]. Entries are keyed by [`EntityKey`], so two field-equal entities are two
//! entries. Mutation is never detected automatically: callers declare it with
//! `mark_modified`, and the tracker only moves entries between states.
//!
//! ```text
//!            track                 mark_modified
//!   (none) ---------> Added      Unchanged -------> Modified
//!                       |            |                  |
//!          mark_removed |            +---mark_removed---+--> Removed
//!                       v                                      |
//!                   detached                           reset   v
//!                                                           evicted
//! ```

use serde_json::Value;
use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};
use tracing::trace;

use crate::{
    configuration::EntityConfiguration,
    entity::{Entity, EntityKey, Tracked},
    error::{DocumentStoreError, DocumentStoreResult},
    serialization::EncodeContext,
    shadow::ShadowStore,
};

/// Lifecycle state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Matches what the store holds as far as the session knows.
    Unchanged,
    /// New; will be created on commit.
    Added,
    /// Declared mutated; will be replaced on commit.
    Modified,
    /// Declared deleted; will be deleted on commit.
    Removed,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityState::Unchanged => "unchanged",
            EntityState::Added => "added",
            EntityState::Modified => "modified",
            EntityState::Removed => "removed",
        };

        f.write_str(name)
    }
}

/// Type-erased view of a tracked entity and its configuration.
pub(crate) trait TrackedEntity: Send + Sync {
    /// Recomputes id and partition key from the entity's current value.
    fn keys(&self) -> DocumentStoreResult<(String, String)>;

    /// Encodes the entity's current value.
    fn encode(&self, shadows: &ShadowStore) -> DocumentStoreResult<Value>;

    /// Serializes the entity's pending domain events.
    fn domain_events(&self) -> DocumentStoreResult<Vec<Value>>;

    /// Clears the entity's pending domain events.
    fn clear_domain_events(&self);

    fn as_any(&self) -> &dyn Any;
}

/// A typed entity handle together with the configuration that maps it.
pub(crate) struct EntitySlot<T> {
    handle: Tracked<T>,
    configuration: Arc<EntityConfiguration<T>>,
}

impl<T: Entity> EntitySlot<T> {
    pub(crate) fn new(handle: Tracked<T>, configuration: Arc<EntityConfiguration<T>>) -> Self {
        Self {
            handle,
            configuration,
        }
    }

    pub(crate) fn handle(&self) -> &Tracked<T> {
        &self.handle
    }
}

impl<T: Entity> TrackedEntity for EntitySlot<T> {
    fn keys(&self) -> DocumentStoreResult<(String, String)> {
        self.configuration.keys_of(&self.handle.read())
    }

    fn encode(&self, shadows: &ShadowStore) -> DocumentStoreResult<Value> {
        let context = EncodeContext {
            key: self.handle.key(),
            shadows,
        };

        self.configuration.encode(&self.handle.read(), &context)
    }

    fn domain_events(&self) -> DocumentStoreResult<Vec<Value>> {
        match self.configuration.domain_events() {
            Some(accessor) => accessor.events(&self.handle.read()),
            None => Ok(Vec::new()),
        }
    }

    fn clear_domain_events(&self) {
        if let Some(accessor) = self.configuration.domain_events() {
            accessor.clear(&mut self.handle.write());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The tracking record of one entity instance.
pub struct EntityEntry {
    key: EntityKey,
    type_id: TypeId,
    type_name: String,
    container: String,
    id: String,
    partition_key: String,
    partition_key_name: String,
    state: EntityState,
    pending_reset: bool,
    written: bool,
    outstanding_events: Vec<Value>,
    slot: Arc<dyn TrackedEntity>,
}

impl EntityEntry {
    /// Creates an entry for `handle` in the given state.
    ///
    /// # Errors
    ///
    /// Returns an invalid-document error when the entity's id or partition key is empty.
    pub(crate) fn new<T: Entity>(
        handle: Tracked<T>,
        configuration: Arc<EntityConfiguration<T>>,
        state: EntityState,
    ) -> DocumentStoreResult<Self> {
        let (id, partition_key) = configuration.keys_of(&handle.read())?;

        Ok(Self {
            key: handle.key(),
            type_id: TypeId::of::<T>(),
            type_name: configuration.type_name().to_string(),
            container: configuration.container_name().to_string(),
            id,
            partition_key,
            partition_key_name: configuration.partition_key_name().to_string(),
            state,
            pending_reset: false,
            written: false,
            outstanding_events: Vec::new(),
            slot: Arc::new(EntitySlot::new(handle, configuration)),
        })
    }

    pub fn key(&self) -> EntityKey {
        self.key
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Wire name of the partition key field.
    pub fn partition_key_name(&self) -> &str {
        &self.partition_key_name
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    /// Returns `true` once a commit has persisted this entry and [`ChangeTracker::reset`] has
    /// not settled it yet.
    pub fn is_pending_reset(&self) -> bool {
        self.pending_reset
    }

    /// Returns `true` when the store already holds the entity's current value but some of its
    /// domain-event records are still unwritten.
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Domain-event records not yet persisted, oldest first.
    pub fn outstanding_events(&self) -> &[Value] {
        &self.outstanding_events
    }

    /// Returns `true` when the next commit has work to do for this entry.
    pub fn has_pending_changes(&self) -> bool {
        self.state != EntityState::Unchanged && !self.pending_reset
    }

    /// Returns the typed handle when the entry tracks a `T`.
    pub fn handle<T: Entity>(&self) -> Option<Tracked<T>> {
        self.slot
            .as_any()
            .downcast_ref::<EntitySlot<T>>()
            .map(|slot| slot.handle().clone())
    }

    pub(crate) fn slot(&self) -> &Arc<dyn TrackedEntity> {
        &self.slot
    }

    /// The store has seen this entity: a commit wrote it, even if it has not settled yet.
    fn persisted(&self) -> bool {
        self.pending_reset || self.written
    }

    fn identifies<T: Entity>(&self, id: &str, partition_key: &str) -> bool {
        self.type_id == TypeId::of::<T>() && self.id == id && self.partition_key == partition_key
    }
}

impl fmt::Debug for EntityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityEntry")
            .field("key", &self.key)
            .field("type_name", &self.type_name)
            .field("container", &self.container)
            .field("id", &self.id)
            .field("partition_key", &self.partition_key)
            .field("state", &self.state)
            .field("pending_reset", &self.pending_reset)
            .field("written", &self.written)
            .field("outstanding_events", &self.outstanding_events.len())
            .finish()
    }
}

/// Ordered collection of the entries of one session.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entries: Vec<EntityEntry>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in tracking order.
    pub fn entries(&self) -> &[EntityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, key: EntityKey) -> Option<&EntityEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Looks up the entry of a `T` by id and partition key.
    pub fn find<T: Entity>(&self, id: &str, partition_key: &str) -> Option<&EntityEntry> {
        self.entries
            .iter()
            .find(|entry| entry.identifies::<T>(id, partition_key))
    }

    /// Keys of the entries the next commit has to persist, in tracking order.
    pub fn pending_keys(&self) -> Vec<EntityKey> {
        self.entries
            .iter()
            .filter(|entry| entry.has_pending_changes())
            .map(|entry| entry.key)
            .collect()
    }

    /// Adds an entry.
    ///
    /// # Errors
    ///
    /// Returns a tracking-state error when the entity is already tracked.
    pub(crate) fn track(&mut self, entry: EntityEntry) -> DocumentStoreResult<()> {
        if self.entry(entry.key).is_some() {
            return Err(DocumentStoreError::TrackingState(format!(
                "{} {} is already tracked",
                entry.type_name, entry.id
            )));
        }

        trace!(key = %entry.key, entity = %entry.type_name, id = %entry.id, state = %entry.state, "tracking entity");

        self.entries.push(entry);

        Ok(())
    }

    /// Declares the entity mutated.
    pub(crate) fn mark_modified(&mut self, key: EntityKey) -> DocumentStoreResult<EntityState> {
        let entry = self.entry_mut(key)?;

        let next = match (entry.state, entry.persisted()) {
            (EntityState::Removed, _) => {
                return Err(DocumentStoreError::TrackingState(format!(
                    "{} {} is removed and cannot be modified",
                    entry.type_name, entry.id
                )));
            }
            (EntityState::Added | EntityState::Modified, true) => EntityState::Modified,
            (EntityState::Added, false) => EntityState::Added,
            (EntityState::Unchanged | EntityState::Modified, _) => EntityState::Modified,
        };

        entry.state = next;
        entry.pending_reset = false;
        entry.written = false;

        Ok(next)
    }

    /// Declares the entity deleted.
    ///
    /// An entity that was added and never persisted is detached instead, and its shadow
    /// values are released. Returns the resulting state, or `None` when the entry was detached.
    pub(crate) fn mark_removed(
        &mut self,
        key: EntityKey,
        shadows: &ShadowStore,
    ) -> DocumentStoreResult<Option<EntityState>> {
        let entry = self.entry_mut(key)?;

        match (entry.state, entry.persisted()) {
            (EntityState::Removed, _) => Err(DocumentStoreError::TrackingState(format!(
                "{} {} is already removed",
                entry.type_name, entry.id
            ))),
            (EntityState::Added, false) => {
                self.detach(key, shadows);

                Ok(None)
            }
            _ => {
                entry.state = EntityState::Removed;
                entry.pending_reset = false;
                entry.written = false;

                Ok(Some(EntityState::Removed))
            }
        }
    }

    /// Records that the entity itself was written and that `events` still have to follow.
    /// The entry keeps its state until the last event is stored.
    pub(crate) fn mark_written(&mut self, key: EntityKey, events: Vec<Value>) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) {
            entry.written = true;
            entry.outstanding_events = events;
        }
    }

    /// Drops the oldest outstanding event once its record is stored.
    pub(crate) fn complete_event(&mut self, key: EntityKey) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) {
            if !entry.outstanding_events.is_empty() {
                entry.outstanding_events.remove(0);
            }
        }
    }

    /// Flags an entry as fully persisted by the current commit.
    pub(crate) fn mark_pending_reset(&mut self, key: EntityKey) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) {
            entry.pending_reset = true;
            entry.written = false;
            entry.outstanding_events.clear();
        }
    }

    /// Settles every entry flagged by a commit. Removed entries are evicted and their shadow
    /// values released; the others become unchanged. Returns the number of settled entries.
    pub(crate) fn reset(&mut self, shadows: &ShadowStore) -> usize {
        let mut settled = 0;

        self.entries.retain_mut(|entry| {
            if !entry.pending_reset {
                return true;
            }

            settled += 1;
            entry.pending_reset = false;

            if entry.state == EntityState::Removed {
                shadows.remove_all(entry.key);
                false
            } else {
                entry.state = EntityState::Unchanged;
                true
            }
        });

        settled
    }

    /// Stops tracking an entity and releases its shadow values.
    pub(crate) fn detach(&mut self, key: EntityKey, shadows: &ShadowStore) -> Option<EntityEntry> {
        let position = self.entries.iter().position(|entry| entry.key == key)?;
        let entry = self.entries.remove(position);

        shadows.remove_all(key);

        trace!(key = %key, entity = %entry.type_name, id = %entry.id, "detached entity");

        Some(entry)
    }

    /// Stops tracking everything and releases all shadow values owned by this tracker.
    pub(crate) fn detach_all(&mut self, shadows: &ShadowStore) {
        for entry in self.entries.drain(..) {
            shadows.remove_all(entry.key);
        }
    }

    fn entry_mut(&mut self, key: EntityKey) -> DocumentStoreResult<&mut EntityEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.key == key)
            .ok_or_else(|| {
                DocumentStoreError::TrackingState(format!("entity {key} is not tracked by this session"))
            })
    }
}
