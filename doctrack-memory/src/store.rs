//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory client that keeps documents as JSON values,
//! grouped by container and partition key, behind an async-safe read-write lock. It
//! behaves like a partitioned document service: it assigns `_etag` and `_ts` on every
//! write, enforces `if_match`, applies batches all-or-nothing and reports a request charge.

use async_trait::async_trait;
use chrono::Utc;
use futures::{
    StreamExt,
    future,
    stream::{self, BoxStream},
};
use mea::rwlock::RwLock;
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::trace;
use uuid::Uuid;

use doctrack_core::{
    client::{
        STATUS_CREATED, STATUS_NO_CONTENT, STATUS_OK, StoreClient, StoreClientBuilder,
        WriteOperation, WriteResponse,
    },
    configuration::{ETAG_FIELD, ID_FIELD, TIMESTAMP_FIELD},
    error::{DocumentStoreError, DocumentStoreResult},
    query::SqlQuery,
};

use crate::evaluator::DocumentFilter;

/// Largest number of operations accepted in one batch.
pub const MAX_BATCH_OPERATIONS: usize = 100;

const WRITE_CHARGE: f64 = 5.0;
const QUERY_CHARGE: f64 = 2.5;

type Partition = BTreeMap<String, Value>;
type Container = HashMap<String, Partition>;
type StoreMap = HashMap<String, Container>;

/// Thread-safe in-memory document store client.
///
/// This struct implements the [`StoreClient`] trait to provide a fully functional
/// partitioned document store that operates entirely in memory using async-aware read-write
/// locks. Documents are indexed by container, partition key and id.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to be
/// safely shared across async tasks. Multiple clones of the same instance share the same
/// underlying data.
///
/// # Partition keys
///
/// Containers may be declared with the wire name of their partition key. Writes to a
/// declared container are rejected when the document does not carry the partition key it is
/// written under. Undeclared containers are created on first write and accept any document.
///
/// # Example
///
/// ```ignore
/// use doctrack_memory::InMemoryStore;
/// use doctrack::client::StoreClient;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.create_item("plans", "p1", json!({ "id": "p1", "name": "Test" })).await?;
///
///     let document = store.read_item("plans", "p1", "p1").await?;
///     assert!(document.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// container name -> (partition key -> (document id -> document))
    store: Arc<RwLock<StoreMap>>,
    /// container name -> partition key wire name
    partition_key_names: Arc<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store with no declared containers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for declaring containers up front.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use doctrack_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder()
    ///     .container("plans", "id")
    ///     .container("todos", "ownerList")
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Names of all containers holding at least one document, sorted.
    pub async fn containers(&self) -> Vec<String> {
        let mut names = self
            .store
            .read()
            .await
            .iter()
            .filter(|(_, container)| container.values().any(|partition| !partition.is_empty()))
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();

        names.sort();
        names
    }

    /// Number of documents stored in a container, across all partitions.
    pub async fn document_count(&self, container: &str) -> usize {
        self.store
            .read()
            .await
            .get(container)
            .map(|container| container.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    /// Applies a write to one partition.
    fn apply(
        &self,
        partition: &mut Partition,
        container: &str,
        partition_key: &str,
        operation: WriteOperation,
    ) -> DocumentStoreResult<WriteResponse> {
        match operation {
            WriteOperation::Create { document } => {
                let mut document = self.prepare(container, partition_key, document)?;
                let id = document_id(&document)?;

                if partition.contains_key(&id) {
                    return Err(DocumentStoreError::DocumentAlreadyExists(id, container.to_string()));
                }

                let etag = stamp(&mut document);
                let request_charge = charge(WRITE_CHARGE, &document);

                partition.insert(id, document);

                Ok(WriteResponse {
                    status: STATUS_CREATED,
                    request_charge,
                    etag: Some(etag),
                })
            }
            WriteOperation::Replace {
                id,
                document,
                if_match,
            } => {
                let mut document = self.prepare(container, partition_key, document)?;

                if document_id(&document)? != id {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "replacement for {id} carries a different id"
                    )));
                }

                check_precondition(partition, container, &id, if_match.as_deref())?;

                let etag = stamp(&mut document);
                let request_charge = charge(WRITE_CHARGE, &document);

                partition.insert(id, document);

                Ok(WriteResponse {
                    status: STATUS_OK,
                    request_charge,
                    etag: Some(etag),
                })
            }
            WriteOperation::Delete { id, if_match } => {
                check_precondition(partition, container, &id, if_match.as_deref())?;

                let request_charge = partition
                    .remove(&id)
                    .map(|document| charge(WRITE_CHARGE, &document))
                    .unwrap_or(WRITE_CHARGE);

                Ok(WriteResponse {
                    status: STATUS_NO_CONTENT,
                    request_charge,
                    etag: None,
                })
            }
        }
    }

    /// Validates a document against its container before it is written.
    fn prepare(&self, container: &str, partition_key: &str, document: Value) -> DocumentStoreResult<Value> {
        if !document.is_object() {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "documents written to {container} must be JSON objects"
            )));
        }

        if let Some(name) = self.partition_key_names.get(container) {
            match document.get(name).and_then(Value::as_str) {
                Some(value) if value == partition_key => {}
                found => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "document partition key {name}={} does not match partition {partition_key}",
                        found.unwrap_or("<missing>")
                    )));
                }
            }
        }

        Ok(document)
    }

    async fn write(
        &self,
        container: &str,
        partition_key: &str,
        operation: WriteOperation,
    ) -> DocumentStoreResult<WriteResponse> {
        let kind = operation.kind();
        let mut store = self.store.write().await;

        let response = match store
            .get_mut(container)
            .and_then(|partitions| partitions.get_mut(partition_key))
        {
            Some(partition) => self.apply(partition, container, partition_key, operation)?,
            None => {
                // Unknown partitions are only created by a write that succeeds.
                let mut partition = Partition::new();
                let response = self.apply(&mut partition, container, partition_key, operation)?;

                store
                    .entry(container.to_string())
                    .or_default()
                    .insert(partition_key.to_string(), partition);

                response
            }
        };

        trace!(
            container,
            partition_key,
            operation = kind,
            request_charge = response.request_charge,
            "applied write"
        );

        Ok(response)
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn read_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> DocumentStoreResult<Option<Value>> {
        Ok(self
            .store
            .read()
            .await
            .get(container)
            .and_then(|container| container.get(partition_key))
            .and_then(|partition| partition.get(id))
            .cloned())
    }

    async fn create_item(
        &self,
        container: &str,
        partition_key: &str,
        document: Value,
    ) -> DocumentStoreResult<WriteResponse> {
        self.write(container, partition_key, WriteOperation::Create { document })
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
        let operation = WriteOperation::Replace {
            id: id.to_string(),
            document,
            if_match: if_match.map(str::to_string),
        };

        self.write(container, partition_key, operation).await
    }

    async fn delete_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
        if_match: Option<&str>,
    ) -> DocumentStoreResult<WriteResponse> {
        let operation = WriteOperation::Delete {
            id: id.to_string(),
            if_match: if_match.map(str::to_string),
        };

        self.write(container, partition_key, operation).await
    }

    async fn execute_batch(
        &self,
        container: &str,
        partition_key: &str,
        operations: Vec<WriteOperation>,
    ) -> DocumentStoreResult<Vec<WriteResponse>> {
        if operations.len() > MAX_BATCH_OPERATIONS {
            return Err(DocumentStoreError::Precondition(format!(
                "a batch holds at most {MAX_BATCH_OPERATIONS} operations, got {}",
                operations.len()
            )));
        }

        let mut store = self.store.write().await;

        // Staged copy; the partition is only swapped in once every operation succeeded.
        let mut staged = store
            .get(container)
            .and_then(|partitions| partitions.get(partition_key))
            .cloned()
            .unwrap_or_default();
        let mut responses = Vec::with_capacity(operations.len());

        for operation in operations {
            responses.push(self.apply(&mut staged, container, partition_key, operation)?);
        }

        store
            .entry(container.to_string())
            .or_default()
            .insert(partition_key.to_string(), staged);

        trace!(
            container,
            partition_key,
            operations = responses.len(),
            "applied batch"
        );

        Ok(responses)
    }

    fn query_items(
        &self,
        container: &str,
        partition_key: &str,
        query: SqlQuery,
    ) -> BoxStream<'static, DocumentStoreResult<Value>> {
        let store = Arc::clone(&self.store);
        let container = container.to_string();
        let partition_key = partition_key.to_string();

        stream::once(async move {
            let filter = DocumentFilter::parse(&query)?;
            let store = store.read().await;
            let documents = store
                .get(&container)
                .and_then(|container| container.get(&partition_key))
                .map(|partition| filter.filter_documents(partition.values()))
                .unwrap_or_default();

            trace!(
                container = %container,
                partition_key = %partition_key,
                results = documents.len(),
                request_charge = QUERY_CHARGE,
                "evaluated query"
            );

            Ok::<_, DocumentStoreError>(documents)
        })
        .flat_map(|result| match result {
            Ok(documents) => stream::iter(documents.into_iter().map(Ok)).left_stream(),
            Err(error) => stream::once(future::ready(Err(error))).right_stream(),
        })
        .boxed()
    }
}

fn document_id(document: &Value) -> DocumentStoreResult<String> {
    match document.get(ID_FIELD).and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(DocumentStoreError::InvalidDocument(
            "documents must carry a non-empty string id".to_string(),
        )),
    }
}

fn check_precondition(
    partition: &Partition,
    container: &str,
    id: &str,
    if_match: Option<&str>,
) -> DocumentStoreResult<()> {
    let current = partition
        .get(id)
        .ok_or_else(|| DocumentStoreError::DocumentNotFound(id.to_string(), container.to_string()))?;

    match if_match {
        Some(expected) if current.get(ETAG_FIELD).and_then(Value::as_str) != Some(expected) => Err(
            DocumentStoreError::ConcurrencyConflict(id.to_string(), container.to_string()),
        ),
        _ => Ok(()),
    }
}

/// Assigns a fresh etag and modification time. Returns the etag.
fn stamp(document: &mut Value) -> String {
    let etag = format!("\"{}\"", Uuid::new_v4());

    if let Some(map) = document.as_object_mut() {
        map.insert(ETAG_FIELD.to_string(), Value::String(etag.clone()));
        map.insert(TIMESTAMP_FIELD.to_string(), Value::from(Utc::now().timestamp()));
    }

    etag
}

/// Request charge of an operation: its base cost plus one unit per started kilobyte.
fn charge(base: f64, document: &Value) -> f64 {
    let bytes = serde_json::to_vec(document).map(|bytes| bytes.len()).unwrap_or(0);

    base + bytes.div_ceil(1024) as f64
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use doctrack_memory::InMemoryStore;
/// use doctrack::client::StoreClientBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder()
///         .container("plans", "id")
///         .build()
///         .await
///         .unwrap();
/// }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    partition_key_names: HashMap<String, String>,
}

impl InMemoryStoreBuilder {
    /// Declares a container and the wire name of its partition key.
    pub fn container(mut self, name: impl Into<String>, partition_key_name: impl Into<String>) -> Self {
        self.partition_key_names
            .insert(name.into(), partition_key_name.into());
        self
    }
}

#[async_trait]
impl StoreClientBuilder for InMemoryStoreBuilder {
    type Client = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> DocumentStoreResult<Self::Client> {
        Ok(InMemoryStore {
            store: Arc::default(),
            partition_key_names: Arc::new(self.partition_key_names),
        })
    }
}
