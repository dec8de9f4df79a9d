//! Units of work.
//!
//! A [`Session`] tracks the entities it reads or is handed, records the lifecycle changes the
//! caller declares, and commits them (see the `commit` module for the write side). Sessions
//! are single-writer: every method that touches tracking state takes `&mut self`.
//!
//! # Example
//!
//! ```ignore
//! let cancel = CancellationToken::new();
//! let mut session = database.session();
//!
//! let plan = session.track(AccountPlan { id: "p1".into(), name: "Test".into() })?;
//! session.save_changes(&cancel).await?;
//!
//! plan.write().name = "Renamed".into();
//! session.mark_modified(&plan)?;
//! session.save_changes(&cancel).await?;
//! ```

use futures::StreamExt;
use serde_json::Value;
use std::{fmt, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    client::StoreClient,
    configuration::{ETAG_FIELD, EntityConfiguration, TYPE_FIELD},
    database::Database,
    entity::{Entity, Tracked},
    error::{DocumentStoreError, DocumentStoreResult},
    query::SqlQuery,
    serialization::Decoded,
    tracking::{ChangeTracker, EntityEntry, EntityState},
};

const TYPE_PARAMETER: &str = "@__type";

/// A unit of work over a [`Database`].
///
/// Dropping a session releases the shadow values of everything it tracks.
pub struct Session<'db, C> {
    pub(crate) database: &'db Database<C>,
    pub(crate) tracker: ChangeTracker,
}

impl<'db, C: StoreClient> Session<'db, C> {
    pub(crate) fn new(database: &'db Database<C>) -> Self {
        Self {
            database,
            tracker: ChangeTracker::new(),
        }
    }

    /// Starts tracking a new entity. It is created in the store by the next commit.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `T` is not part of the model, an invalid-document
    /// error when its id or partition key is empty, and a tracking-state error when another
    /// instance with the same id and partition key is already tracked.
    pub fn track<T: Entity>(&mut self, entity: T) -> DocumentStoreResult<Tracked<T>> {
        let handle = Tracked::new(entity);

        self.track_handle(&handle)?;

        Ok(handle)
    }

    /// Starts tracking an existing handle as a new entity, for example one evicted earlier.
    ///
    /// # Errors
    ///
    /// Same as [`Session::track`]; tracking a handle this session already tracks is a
    /// tracking-state error.
    pub fn track_handle<T: Entity>(&mut self, handle: &Tracked<T>) -> DocumentStoreResult<()> {
        let configuration = self.database.registry().get::<T>()?;
        let entry = EntityEntry::new(handle.clone(), configuration, EntityState::Added)?;

        if let Some(existing) = self.tracker.find::<T>(entry.id(), entry.partition_key()) {
            if existing.key() != entry.key() {
                return Err(DocumentStoreError::TrackingState(format!(
                    "another {} with id {} is already tracked in partition {}",
                    entry.type_name(),
                    entry.id(),
                    entry.partition_key()
                )));
            }
        }

        self.tracker.track(entry)
    }

    /// Declares that a tracked entity was mutated.
    ///
    /// # Errors
    ///
    /// Returns a tracking-state error when the entity is untracked or removed.
    pub fn mark_modified<T: Entity>(&mut self, entity: &Tracked<T>) -> DocumentStoreResult<()> {
        self.tracker.mark_modified(entity.key()).map(|_| ())
    }

    /// Declares that a tracked entity is deleted.
    ///
    /// An entity that was tracked but never committed simply stops being tracked.
    ///
    /// # Errors
    ///
    /// Returns a tracking-state error when the entity is untracked or already removed.
    pub fn mark_removed<T: Entity>(&mut self, entity: &Tracked<T>) -> DocumentStoreResult<()> {
        self.tracker
            .mark_removed(entity.key(), self.database.shadows())
            .map(|_| ())
    }

    /// Stops tracking an entity without writing anything. Pending changes are discarded.
    ///
    /// # Errors
    ///
    /// Returns a tracking-state error when the entity is not tracked.
    pub fn evict<T: Entity>(&mut self, entity: &Tracked<T>) -> DocumentStoreResult<()> {
        self.tracker
            .detach(entity.key(), self.database.shadows())
            .map(|_| ())
            .ok_or_else(|| {
                DocumentStoreError::TrackingState(format!(
                    "entity {} is not tracked by this session",
                    entity.key()
                ))
            })
    }

    /// Reads an entity by id and partition key.
    ///
    /// An instance already tracked by this session is returned as is without reading the
    /// store. Otherwise the document is read, decoded and tracked as unchanged.
    ///
    /// Returns `Ok(None)` when the document does not exist.
    pub async fn find<T: Entity>(
        &mut self,
        id: &str,
        partition_key: &str,
        cancel: &CancellationToken,
    ) -> DocumentStoreResult<Option<Tracked<T>>> {
        let configuration = self.database.registry().get::<T>()?;

        if let Some(entry) = self.tracker.find::<T>(id, partition_key) {
            return Ok(entry.handle::<T>());
        }

        ensure_not_cancelled(cancel)?;

        let document = self
            .database
            .client()
            .read_item(configuration.container_name(), id, partition_key)
            .await?;

        debug!(
            database = %self.database.options().database_id,
            container = configuration.container_name(),
            id,
            partition_key,
            found = document.is_some(),
            "read item"
        );

        document
            .map(|document| self.materialize(&configuration, document))
            .transpose()
    }

    /// Reads an entity whose partition key is its id.
    pub async fn find_by_id<T: Entity>(
        &mut self,
        id: &str,
        cancel: &CancellationToken,
    ) -> DocumentStoreResult<Option<Tracked<T>>> {
        self.find::<T>(id, id, cancel).await
    }

    /// Runs a query in one partition and tracks the results as unchanged.
    ///
    /// When the model writes type discriminators, the query is narrowed to documents of `T`.
    /// Results already tracked by this session resolve to the tracked instance.
    pub async fn query<T: Entity>(
        &mut self,
        partition_key: &str,
        query: SqlQuery,
        cancel: &CancellationToken,
    ) -> DocumentStoreResult<Vec<Tracked<T>>> {
        self.run_query(partition_key, query, cancel, usize::MAX)
            .await
    }

    /// Runs a query and returns its first result, if any.
    pub async fn query_first<T: Entity>(
        &mut self,
        partition_key: &str,
        query: SqlQuery,
        cancel: &CancellationToken,
    ) -> DocumentStoreResult<Option<Tracked<T>>> {
        Ok(self
            .run_query(partition_key, query, cancel, 1)
            .await?
            .into_iter()
            .next())
    }

    /// Settles every entry persisted by the last commit: added and modified entities become
    /// unchanged, removed ones stop being tracked. Entries whose write failed are untouched.
    ///
    /// Returns the number of settled entries.
    pub fn reset(&mut self) -> usize {
        self.tracker.reset(self.database.shadows())
    }

    /// Current lifecycle state of an entity, or `None` when it is not tracked.
    pub fn state_of<T: Entity>(&self, entity: &Tracked<T>) -> Option<EntityState> {
        self.tracker
            .entry(entity.key())
            .map(EntityEntry::state)
    }

    /// The etag the store last reported for a tracked entity.
    pub fn concurrency_token<T: Entity>(&self, entity: &Tracked<T>) -> Option<String> {
        self.tracker.entry(entity.key())?;

        self.database
            .shadows()
            .get(entity.key(), ETAG_FIELD)
            .and_then(|etag| etag.as_str().map(str::to_string))
    }

    /// Tracked entries, in tracking order.
    pub fn entries(&self) -> &[EntityEntry] {
        self.tracker.entries()
    }

    /// Returns `true` when the next commit has work to do.
    pub fn has_changes(&self) -> bool {
        self.tracker
            .entries()
            .iter()
            .any(EntityEntry::has_pending_changes)
    }

    pub fn database(&self) -> &'db Database<C> {
        self.database
    }

    async fn run_query<T: Entity>(
        &mut self,
        partition_key: &str,
        query: SqlQuery,
        cancel: &CancellationToken,
        limit: usize,
    ) -> DocumentStoreResult<Vec<Tracked<T>>> {
        let configuration = self.database.registry().get::<T>()?;
        let query = if configuration.emits_type_discriminator() {
            query.and_where(TYPE_FIELD, TYPE_PARAMETER, configuration.type_name())
        } else {
            query
        };

        ensure_not_cancelled(cancel)?;

        debug!(
            database = %self.database.options().database_id,
            container = configuration.container_name(),
            partition_key,
            query = query.text(),
            "query items"
        );

        let mut documents = self.database.client().query_items(
            configuration.container_name(),
            partition_key,
            query,
        );
        let mut results = Vec::new();

        while results.len() < limit {
            let Some(document) = documents.next().await else {
                break;
            };

            ensure_not_cancelled(cancel)?;
            results.push(self.materialize(&configuration, document?)?);
        }

        Ok(results)
    }

    fn materialize<T: Entity>(
        &mut self,
        configuration: &Arc<EntityConfiguration<T>>,
        document: Value,
    ) -> DocumentStoreResult<Tracked<T>> {
        let Decoded {
            entity,
            shadow_values,
        } = configuration.decode(document)?;
        let (id, partition_key) = configuration.keys_of(&entity)?;

        if let Some(tracked) = self
            .tracker
            .find::<T>(&id, &partition_key)
            .and_then(EntityEntry::handle::<T>)
        {
            return Ok(tracked);
        }

        let handle = Tracked::new(entity);
        let entry = EntityEntry::new(handle.clone(), Arc::clone(configuration), EntityState::Unchanged)?;

        self.database
            .shadows()
            .adopt_all(handle.key(), shadow_values)?;
        self.tracker.track(entry)?;

        Ok(handle)
    }
}

impl<C> Drop for Session<'_, C> {
    fn drop(&mut self) {
        self.tracker.detach_all(self.database.shadows());
    }
}

impl<C> fmt::Debug for Session<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("database_id", &self.database.options().database_id)
            .field("tracker", &self.tracker)
            .finish()
    }
}

pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> DocumentStoreResult<()> {
    if cancel.is_cancelled() {
        return Err(DocumentStoreError::Cancelled);
    }

    Ok(())
}
