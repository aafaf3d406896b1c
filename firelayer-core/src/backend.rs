//! Storage backend abstraction for the document store.
//!
//! This module defines the collaborator the facades are built on: a keyed store (point
//! get/set/delete by document reference) combined with an ordered query source (filter,
//! order, `start_after`, `end_before`, limit) that can run over a single collection or a
//! whole collection group.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use firelayer::backend::StoreBackend;
//! use firelayer::document::DocumentRef;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! let reference = backend.add_document("users", doc! { "name": "Alice" }).await?;
//! let raw = backend.get_document(&reference).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    document::{DocumentRef, RawRecord},
    error::DocumentStoreResult,
    query::{Query, QueryScope},
};

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Error Handling
///
/// Connectivity, quota and permission failures are reported as
/// [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend). Callers in this
/// crate never retry them.
///
/// # Ordered queries
///
/// [`query_documents`](StoreBackend::query_documents) must honour the following:
///
/// - documents lacking the ordered field are excluded from ordered results,
/// - ties on the ordered field are broken by document path,
/// - `start_after(c)` keeps documents strictly after `c` in the query order and
///   `end_before(c)` keeps documents strictly before it,
/// - `offset` and `limit` apply after the cursor boundaries.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Reads a single document. Returns `Ok(None)` if it does not exist.
    async fn get_document(&self, reference: &DocumentRef) -> DocumentStoreResult<Option<RawRecord>>;

    /// Writes a document, replacing it entirely if it already exists.
    async fn set_document(
        &self,
        reference: &DocumentRef,
        data: bson::Document,
    ) -> DocumentStoreResult<()>;

    /// Creates a document with a store-assigned id and returns its reference.
    async fn add_document(
        &self,
        collection: &str,
        data: bson::Document,
    ) -> DocumentStoreResult<DocumentRef>;

    /// Deletes a document. Deleting a missing document succeeds.
    ///
    /// Sub-collections nested under the document are left untouched.
    async fn delete_document(&self, reference: &DocumentRef) -> DocumentStoreResult<()>;

    /// Deletes a document together with every sub-collection nested under it.
    async fn recursive_delete(&self, reference: &DocumentRef) -> DocumentStoreResult<()>;

    /// Runs an ordered query over a collection or collection group.
    ///
    /// # See Also
    ///
    /// - [`Query`] for constructing queries
    /// - [`crate::query::Filter`] for building filter expressions
    async fn query_documents(
        &self,
        scope: &QueryScope,
        query: Query,
    ) -> DocumentStoreResult<Vec<RawRecord>>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn get_document(&self, reference: &DocumentRef) -> DocumentStoreResult<Option<RawRecord>> {
        (*self).get_document(reference).await
    }

    async fn set_document(
        &self,
        reference: &DocumentRef,
        data: bson::Document,
    ) -> DocumentStoreResult<()> {
        (*self).set_document(reference, data).await
    }

    async fn add_document(
        &self,
        collection: &str,
        data: bson::Document,
    ) -> DocumentStoreResult<DocumentRef> {
        (*self).add_document(collection, data).await
    }

    async fn delete_document(&self, reference: &DocumentRef) -> DocumentStoreResult<()> {
        (*self).delete_document(reference).await
    }

    async fn recursive_delete(&self, reference: &DocumentRef) -> DocumentStoreResult<()> {
        (*self).recursive_delete(reference).await
    }

    async fn query_documents(
        &self,
        scope: &QueryScope,
        query: Query,
    ) -> DocumentStoreResult<Vec<RawRecord>> {
        (*self).query_documents(scope, query).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
