//! Error types and result types for mapping and store operations.
//!
//! This module provides error handling for every layer of the crate, from model configuration
//! to commit. Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use serde_json::Error as SerdeJsonError;
use std::fmt;
use thiserror::Error;

/// Represents all possible errors that can occur when mapping, tracking or committing entities.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between entities and JSON documents.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The model configuration is invalid (duplicate registration, colliding names,
    /// missing selector or an unregistered entity type).
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// An operation was attempted on an entry whose lifecycle state does not allow it.
    #[error("Tracking state error: {0}")]
    TrackingState(String),
    /// A replace or delete was rejected because the tracked etag is stale.
    /// The first argument is the document ID, the second is the container name.
    #[error("Concurrency conflict on document {0} in container {1}")]
    ConcurrencyConflict(String, String),
    /// A document with the given ID already exists in the container.
    /// The first argument is the document ID, the second is the container name.
    #[error("Document {0} already exists in container {1}")]
    DocumentAlreadyExists(String, String),
    /// The document targeted by a write was not found in the container.
    /// The first argument is the document ID, the second is the container name.
    #[error("Document not found {0} in container {1}")]
    DocumentNotFound(String, String),
    /// The document violates structural requirements (empty id or partition key, non-object).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A query could not be parsed or uses an unsupported construct.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// A commit request violated a precondition and no store operation was issued.
    #[error("Precondition failed: {0}")]
    Precondition(String),
    /// One or more operations of a best-effort commit failed.
    #[error("{} of the committed entries failed: {}", .0.len(), CommitFailures(.0))]
    PartialCommit(Vec<CommitFailure>),
    /// The operation observed a cancellation request before issuing the next store call.
    #[error("Operation cancelled")]
    Cancelled,
    /// An error occurred in the underlying store client.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns `true` when the error reports a stale optimistic-concurrency token.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DocumentStoreError::ConcurrencyConflict(..))
    }
}

/// A specialized `Result` type for doctrack operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

/// The failure of a single entry inside a best-effort commit.
#[derive(Debug)]
pub struct CommitFailure {
    /// Id of the entity whose operation failed.
    pub id: String,
    /// Container the operation targeted.
    pub container: String,
    /// The underlying error.
    pub error: DocumentStoreError,
}

impl fmt::Display for CommitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.container, self.id, self.error)
    }
}

struct CommitFailures<'a>(&'a [CommitFailure]);

impl fmt::Display for CommitFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }

            write!(f, "{failure}")?;
        }

        Ok(())
    }
}
