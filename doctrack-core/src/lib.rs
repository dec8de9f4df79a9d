//! An object-document mapping layer with change tracking for partitioned JSON document stores.
//!
//! This crate is the core of the doctrack project and provides:
//!
//! - **Model configuration** ([`model`], [`configuration`]) - Fluent per-type mapping frozen into an immutable registry
//! - **Shadow values** ([`shadow`]) - Out-of-band values (etag, computed keys) kept next to entities, not in them
//! - **Serialization pipeline** ([`serialization`]) - Rewrite rules applied around `serde_json`
//! - **Change tracking** ([`tracking`]) - Identity map and lifecycle state of tracked entities
//! - **Sessions and commits** ([`session`], [`commit`]) - Units of work committed per entry or as one atomic batch
//! - **Store client abstraction** ([`client`], [`query`]) - Traits for implementing different stores
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use doctrack_core::{database::Database, model::ModelBuilder, options::DatabaseOptions};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct AccountPlan {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! let options = DatabaseOptions::new("billing");
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
//!
//! session.track(AccountPlan { id: "p1".into(), name: "Test".into() })?;
//! session.save_changes(&CancellationToken::new()).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as doctrack_core;

pub mod client;
pub mod commit;
pub mod configuration;
pub mod database;
pub mod entity;
pub mod error;
pub mod model;
pub mod options;
pub mod query;
pub mod schema;
pub mod selector;
pub mod serialization;
pub mod session;
pub mod shadow;
pub mod tracking;
