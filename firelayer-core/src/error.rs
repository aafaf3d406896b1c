//! Error types and result types for document store operations.
//!
//! This module provides error handling for the facades, the batch loader and the
//! paginator. Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
///
/// The enum is `Clone` because a single batched lookup result may be handed to several
/// concurrent callers of [`Loader::load`](crate::loader::Loader::load).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between a payload and BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The requested document was not found.
    /// The first argument is the identifier, the second is the collection path or group name.
    #[error("Document not found {0} in {1}")]
    DocumentNotFound(String, String),
    /// A record returned by a pagination query does not carry the cursor field.
    /// The first argument is the field name, the second is the document path.
    #[error("Cursor field {0} is missing on record {1}")]
    MissingCursorField(String, String),
    /// The query cannot be executed as constructed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// The facade or a record type is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A pending lookup was abandoned before its batch was dispatched.
    #[error("Load canceled: {0}")]
    LoadCanceled(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns `true` if this error reports a missing document.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::DocumentNotFound(..))
    }

    /// Returns `true` if this error reports a record without its cursor field.
    pub fn is_missing_cursor_field(&self) -> bool {
        matches!(self, DocumentStoreError::MissingCursorField(..))
    }
}

/// A specialized `Result` type for document store operations.
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
