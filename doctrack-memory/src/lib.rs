//! In-memory document store client for doctrack.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreClient` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Partitioned storage** - Documents are grouped by container and partition key
//! - **Optimistic concurrency** - Server-assigned `_etag` and `_ts`, `if_match` enforcement
//! - **Atomic batches** - Partition-scoped batches applied all-or-nothing
//! - **Query support** - Equality and comparison filters over a single partition
//!
//! # Quick Start
//!
//! ```ignore
//! use doctrack::{Database, model::ModelBuilder, options::DatabaseOptions, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct AccountPlan {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
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
//!     let mut session = database.session();
//!
//!     session.track(AccountPlan { id: "p1".into(), name: "Test".into() })?;
//!     session.save_changes(&CancellationToken::new()).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doctrack_memory;

pub mod store;
mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
