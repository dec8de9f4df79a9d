//! Main doctrack crate providing an object-document mapping layer with change tracking.
//!
//! This crate is the primary entry point for users of doctrack. It re-exports the core types
//! from `doctrack-core` and provides access to the bundled store clients.
//!
//! # Features
//!
//! - **Fluent model configuration** - Containers, ids, partition keys, shadow and computed properties
//! - **Shadow values** - Etags and computed partition keys are kept next to your types, not in them
//! - **Change tracking** - An identity map per session with explicit lifecycle transitions
//! - **Units of work** - Best-effort or single-partition atomic commits with optimistic concurrency
//! - **Domain events** - Persisted as separate records after each successful write
//!
//! # Quick Start
//!
//! ```ignore
//! use doctrack::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct AccountPlan {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let options = DatabaseOptions::new("billing");
//!     let registry = ModelBuilder::new(options.clone())
//!         .define_entity::<AccountPlan>(|plan| {
//!             plan.container("plans")
//!                 .id(|p| p.id.clone())
//!                 .partition_key("id", |p| p.id.clone())
//!         })
//!         .build()?;
//!
//!     let database = Database::new(InMemoryStore::new(), registry, options);
//!     let cancel = CancellationToken::new();
//!
//!     // Create
//!     let mut session = database.session();
//!     session.track(AccountPlan { id: "p1".into(), name: "Test".into() })?;
//!     session.save_changes(&cancel).await?;
//!
//!     // Update with optimistic concurrency
//!     let mut session = database.session();
//!     let plan = session
//!         .find_by_id::<AccountPlan>("p1", &cancel)
//!         .await?
//!         .expect("plan exists");
//!
//!     plan.write().name = "Renamed".into();
//!     session.mark_modified(&plan)?;
//!     session.save_changes(&cancel).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Atomic commits
//!
//! Everything pending in a session can be written as one batch when it lives in a single
//! container and partition:
//!
//! ```ignore
//! let mut session = database.session();
//!
//! session.track(TodoItem::new("alice", "groceries", "milk"))?;
//! session.track(TodoItem::new("alice", "groceries", "bread"))?;
//! session.save_changes_transaction(&cancel).await?;
//! ```
//!
//! # Stores
//!
//! - [`memory`] - In-memory store for development and testing
//!
//! Other stores implement [`client::StoreClient`].

pub mod prelude;

pub use doctrack_core::{
    client, commit, configuration, database, entity, error, model, options, query, schema,
    selector, serialization, session, shadow, tracking,
};

pub use doctrack_core::{database::Database, entity::Tracked, session::Session};

// Re-export the JSON and cancellation types that appear in the public API
pub use serde_json;
pub use tokio_util::sync::CancellationToken;

/// In-memory store client.
pub mod memory {
    pub use doctrack_memory::{InMemoryStore, InMemoryStoreBuilder};
}
