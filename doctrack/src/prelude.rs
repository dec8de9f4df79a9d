//! Convenient re-exports of commonly used types from doctrack.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use doctrack::prelude::*;
//! ```
//!
//! This provides access to:
//! - Entities, handles and the model builder
//! - Databases, sessions and commit reports
//! - Store client traits and queries
//! - Serialization rules and error types

pub use doctrack_core::{
    client::{StoreClient, StoreClientBuilder, WriteOperation, WriteResponse},
    commit::CommitReport,
    configuration::{EntityConfiguration, EntityConfigurationRegistry},
    database::Database,
    entity::{Entity, EntityKey, Tracked},
    error::{CommitFailure, DocumentStoreError, DocumentStoreResult},
    model::{EntityBuilder, ModelBuilder},
    options::{DatabaseOptions, NamingPolicy},
    query::SqlQuery,
    serialization::{DecodeContext, DocumentMap, DocumentRule, EncodeContext},
    session::Session,
    shadow::ShadowStore,
    tracking::{EntityEntry, EntityState},
};

pub use tokio_util::sync::CancellationToken;
