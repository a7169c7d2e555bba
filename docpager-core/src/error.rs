//! The error type shared by every docpager crate.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Everything that can go wrong while storing, querying or paginating documents.
///
/// Any error aborts the call that produced it; a page is never returned alongside one.
/// Transient backend failures surface as [`Backend`](Self::Backend) and are not retried.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// A value could not be converted between BSON, JSON or a typed model.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A client or runtime could not be set up.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Inserting would duplicate an identifier: `(id, collection)`.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document cannot be stored as given, e.g. its `_id` has an unsupported type.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A selector or filter document does not describe a query.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// The call has no collection to work on.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Pagination input is out of range or contradicts itself.
    #[error("Invalid pagination arguments: {0}")]
    InvalidPaginationArgs(String),
    /// A boundary token does not decode for the requested sort key.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Result set is closed")]
    ResultSetClosed,
    /// The backend cannot perform this operation; callers may fall back to a simpler one.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// The storage backend reported a failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
