//! Store client abstraction for partitioned document stores.
//!
//! This module defines the interface the mapping layer consumes to read and write documents.
//! Implementations talk to a concrete store (an in-memory map, a remote service); the core
//! never performs I/O on its own.
//!
//! # Overview
//!
//! The [`StoreClient`] trait provides point reads, single-document writes guarded by an
//! optional `if_match` etag, all-or-nothing batches scoped to one partition, and lazy
//! partition queries. Implementations must be thread-safe (`Send + Sync`).
//!
//! # Traits
//!
//! - [`StoreClient`]: The core trait for store clients
//! - [`StoreClientBuilder`]: Factory trait for creating client instances
//!
//! # Examples
//!
//! ```ignore
//! use doctrack::client::{StoreClient, WriteOperation};
//! use serde_json::json;
//!
//! let client = MyClient::new();
//!
//! let created = client
//!     .create_item("plans", "p1", json!({ "id": "p1", "name": "Test" }))
//!     .await?;
//!
//! client
//!     .replace_item("plans", "p1", "p1", json!({ "id": "p1", "name": "New" }), created.etag.as_deref())
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt::Debug, sync::Arc};

use crate::{error::DocumentStoreResult, query::SqlQuery};

/// HTTP-style status of a successful create.
pub const STATUS_CREATED: u16 = 201;
/// HTTP-style status of a successful replace.
pub const STATUS_OK: u16 = 200;
/// HTTP-style status of a successful delete.
pub const STATUS_NO_CONTENT: u16 = 204;

/// Outcome of one successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    /// HTTP-style status code reported by the store.
    pub status: u16,
    /// Cost of the operation in store-defined request units.
    pub request_charge: f64,
    /// New etag of the written document. `None` for deletes.
    pub etag: Option<String>,
}

/// A single write, as classified from a tracked entry or a domain-event record.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    /// Creates a new document. Fails when the id already exists.
    Create {
        /// The full document, including `id`.
        document: Value,
    },
    /// Replaces an existing document.
    Replace {
        id: String,
        document: Value,
        /// Etag the stored document must still carry.
        if_match: Option<String>,
    },
    /// Deletes an existing document.
    Delete {
        id: String,
        /// Etag the stored document must still carry.
        if_match: Option<String>,
    },
}

impl WriteOperation {
    /// Short name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            WriteOperation::Create { .. } => "create",
            WriteOperation::Replace { .. } => "replace",
            WriteOperation::Delete { .. } => "delete",
        }
    }

    /// Issues this operation as a single-document call.
    pub async fn execute<C>(
        self,
        client: &C,
        container: &str,
        partition_key: &str,
    ) -> DocumentStoreResult<WriteResponse>
    where
        C: StoreClient + ?Sized,
    {
        match self {
            WriteOperation::Create { document } => {
                client
                    .create_item(container, partition_key, document)
                    .await
            }
            WriteOperation::Replace {
                id,
                document,
                if_match,
            } => {
                client
                    .replace_item(container, &id, partition_key, document, if_match.as_deref())
                    .await
            }
            WriteOperation::Delete { id, if_match } => {
                client
                    .delete_item(container, &id, partition_key, if_match.as_deref())
                    .await
            }
        }
    }
}

/// Abstract interface for partitioned document store clients.
///
/// # Error Handling
///
/// Writes against a missing document return
/// [`DocumentNotFound`](crate::error::DocumentStoreError::DocumentNotFound), creates of an
/// existing id return
/// [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists), and
/// a stale `if_match` returns
/// [`ConcurrencyConflict`](crate::error::DocumentStoreError::ConcurrencyConflict). Reads of
/// a missing document are not errors.
#[async_trait]
pub trait StoreClient: Send + Sync + Debug {
    /// Reads one document by id within a partition.
    ///
    /// Returns `Ok(None)` when the document does not exist.
    async fn read_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> DocumentStoreResult<Option<Value>>;

    /// Creates a document. The document's `id` field names it.
    async fn create_item(
        &self,
        container: &str,
        partition_key: &str,
        document: Value,
    ) -> DocumentStoreResult<WriteResponse>;

    /// Replaces a document, optionally only if its etag still equals `if_match`.
    async fn replace_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
        document: Value,
        if_match: Option<&str>,
    ) -> DocumentStoreResult<WriteResponse>;

    /// Deletes a document, optionally only if its etag still equals `if_match`.
    async fn delete_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
        if_match: Option<&str>,
    ) -> DocumentStoreResult<WriteResponse>;

    /// Applies every operation in one partition atomically: either all succeed and one
    /// response per operation is returned in order, or none is applied.
    async fn execute_batch(
        &self,
        container: &str,
        partition_key: &str,
        operations: Vec<WriteOperation>,
    ) -> DocumentStoreResult<Vec<WriteResponse>>;

    /// Runs a query within one partition. Documents are produced lazily as the stream is
    /// polled.
    fn query_items(
        &self,
        container: &str,
        partition_key: &str,
        query: SqlQuery,
    ) -> BoxStream<'static, DocumentStoreResult<Value>>;
}

#[async_trait]
impl<C> StoreClient for &C
where
    C: StoreClient + ?Sized,
{
    async fn read_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> DocumentStoreResult<Option<Value>> {
        (**self)
            .read_item(container, id, partition_key)
            .await
    }

    async fn create_item(
        &self,
        container: &str,
        partition_key: &str,
        document: Value,
    ) -> DocumentStoreResult<WriteResponse> {
        (**self)
            .create_item(container, partition_key, document)
            .await
    }

    async fn replace_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
        document: Value,
        if_match: Option<&str>,
    ) -> DocumentStoreResult<WriteResponse> {
        (**self)
            .replace_item(container, id, partition_key, document, if_match)
            .await
    }

    async fn delete_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
        if_match: Option<&str>,
    ) -> DocumentStoreResult<WriteResponse> {
        (**self)
            .delete_item(container, id, partition_key, if_match)
            .await
    }

    async fn execute_batch(
        &self,
        container: &str,
        partition_key: &str,
        operations: Vec<WriteOperation>,
    ) -> DocumentStoreResult<Vec<WriteResponse>> {
        (**self)
            .execute_batch(container, partition_key, operations)
            .await
    }

    fn query_items(
        &self,
        container: &str,
        partition_key: &str,
        query: SqlQuery,
    ) -> BoxStream<'static, DocumentStoreResult<Value>> {
        (**self).query_items(container, partition_key, query)
    }
}

#[async_trait]
impl<C> StoreClient for Arc<C>
where
    C: StoreClient + ?Sized,
{
    async fn read_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> DocumentStoreResult<Option<Value>> {
        (**self)
            .read_item(container, id, partition_key)
            .await
    }

    async fn create_item(
        &self,
        container: &str,
        partition_key: &str,
        document: Value,
    ) -> DocumentStoreResult<WriteResponse> {
        (**self)
            .create_item(container, partition_key, document)
            .await
    }

    async fn replace_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
        document: Value,
        if_match: Option<&str>,
    ) -> DocumentStoreResult<WriteResponse> {
        (**self)
            .replace_item(container, id, partition_key, document, if_match)
            .await
    }

    async fn delete_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
        if_match: Option<&str>,
    ) -> DocumentStoreResult<WriteResponse> {
        (**self)
            .delete_item(container, id, partition_key, if_match)
            .await
    }

    async fn execute_batch(
        &self,
        container: &str,
        partition_key: &str,
        operations: Vec<WriteOperation>,
    ) -> DocumentStoreResult<Vec<WriteResponse>> {
        (**self)
            .execute_batch(container, partition_key, operations)
            .await
    }

    fn query_items(
        &self,
        container: &str,
        partition_key: &str,
        query: SqlQuery,
    ) -> BoxStream<'static, DocumentStoreResult<Value>> {
        (**self).query_items(container, partition_key, query)
    }
}

/// Factory for store clients that need asynchronous setup.
#[async_trait]
pub trait StoreClientBuilder {
    type Client: StoreClient;

    async fn build(self) -> DocumentStoreResult<Self::Client>;
}
