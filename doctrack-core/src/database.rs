//! The entry point that ties a store client to a frozen model.
//!
//! # Example
//!
//! ```ignore
//! use doctrack::{Database, model::ModelBuilder, options::DatabaseOptions};
//!
//! let options = DatabaseOptions::new("todo");
//! let registry = ModelBuilder::new(options.clone())
//!     .define_entity::<AccountPlan>(|plan| {
//!         plan.container("plans")
//!             .id(|p| p.id.clone())
//!             .partition_key("id", |p| p.id.clone())
//!     })
//!     .build()?;
//!
//! let database = Database::new(client, registry, options);
//! let mut session = database.session();
//! ```

use chrono::Utc;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    client::StoreClient,
    configuration::EntityConfigurationRegistry,
    options::DatabaseOptions,
    session::Session,
    shadow::ShadowStore,
};

/// Issues ids for domain-event records.
///
/// Ids are decimal strings that strictly increase for the lifetime of the generator. The
/// sequence starts at the creation time in microseconds so ids stay ahead of those issued
/// by earlier processes on the same clock.
#[derive(Debug)]
pub struct EventIdGenerator {
    next: AtomicU64,
}

impl EventIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default())
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A store client bound to a model.
///
/// The database owns the state shared by all of its sessions: the client, the registry, the
/// shadow store and the event id generator. Sessions borrow it, so a `Database` is usually
/// created once and kept for the lifetime of the application.
pub struct Database<C> {
    client: C,
    registry: Arc<EntityConfigurationRegistry>,
    shadows: Arc<ShadowStore>,
    options: DatabaseOptions,
    event_ids: EventIdGenerator,
}

impl<C: StoreClient> Database<C> {
    /// Binds `client` to a registry built with the same `options`.
    pub fn new(
        client: C,
        registry: impl Into<Arc<EntityConfigurationRegistry>>,
        options: DatabaseOptions,
    ) -> Self {
        Self {
            client,
            registry: registry.into(),
            shadows: Arc::new(ShadowStore::new()),
            options,
            event_ids: EventIdGenerator::new(),
        }
    }

    /// Starts a unit of work.
    pub fn session(&self) -> Session<'_, C> {
        Session::new(self)
    }
}

impl<C> Database<C> {
    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn registry(&self) -> &EntityConfigurationRegistry {
        &self.registry
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Number of entities that currently hold shadow values across all live sessions.
    pub fn shadow_entries(&self) -> usize {
        self.shadows.len()
    }

    pub(crate) fn shadows(&self) -> &ShadowStore {
        &self.shadows
    }

    pub(crate) fn event_ids(&self) -> &EventIdGenerator {
        &self.event_ids
    }
}

impl<C: fmt::Debug> fmt::Debug for Database<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("database_id", &self.options.database_id)
            .field("client", &self.client)
            .field("registry", &self.registry)
            .field("shadow_entries", &self.shadows.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_increase() {
        let generator = EventIdGenerator::starting_at(41);

        assert_eq!(generator.next_id(), "41");
        assert_eq!(generator.next_id(), "42");
    }

    #[test]
    fn default_generator_starts_at_the_clock() {
        let before = Utc::now().timestamp_micros() as u64;
        let first = EventIdGenerator::new().next_id().parse::<u64>().unwrap();

        assert!(first >= before);
    }
}
