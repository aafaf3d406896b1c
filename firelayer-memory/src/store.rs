//! In-memory storage implementation for document stores.
//!
//! Documents are kept as BSON documents in a map keyed by collection path, behind an
//! async-aware read-write lock. Ordered queries follow the rules of
//! [`StoreBackend::query_documents`].

use async_trait::async_trait;
use bson::Document;
use mea::rwlock::RwLock;
use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use tracing::trace;
use uuid::Uuid;

use firelayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{DocumentRef, RawRecord},
    error::DocumentStoreResult,
    query::{Query, QueryScope, SortDirection},
};

use crate::evaluator::{Comparable, DocumentEvaluator, lookup};

type CollectionMap = HashMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan every document in scope (no indexing). Collection group queries scan
/// every collection whose last path segment matches the group name.
///
/// # Example
///
/// ```ignore
/// use firelayer_memory::InMemoryStore;
/// use firelayer::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
///
/// let reference = store.add_document("users", doc! { "name": "Alice" }).await?;
/// let raw = store.get_document(&reference).await?;
/// assert!(raw.is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection path -> (document id -> document)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`, optionally seeded with documents.
    ///
    /// ```ignore
    /// let store = InMemoryStore::builder()
    ///     .with_document(DocumentRef::new("users", "u1"), doc! { "name": "Alice" })
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns the number of documents stored in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map_or(0, HashMap::len)
    }
}

fn in_scope(scope: &QueryScope, collection: &str) -> bool {
    match scope {
        QueryScope::Collection(path) => path == collection,
        QueryScope::Group(name) => collection.rsplit('/').next() == Some(name.as_str()),
    }
}

struct Candidate<'a> {
    collection: &'a str,
    id: &'a str,
    data: &'a Document,
}

impl Candidate<'_> {
    fn cmp_path(&self, other: &Self) -> Ordering {
        (self.collection, self.id).cmp(&(other.collection, other.id))
    }
}

/// Runs `query` over the documents of `store` in `scope`.
fn execute(store: &StoreMap, scope: &QueryScope, query: &Query) -> DocumentStoreResult<Vec<RawRecord>> {
    query.validate()?;

    let mut candidates = Vec::new();

    for (collection, documents) in store
        .iter()
        .filter(|(collection, _)| in_scope(scope, collection))
    {
        for (id, data) in documents {
            let keep = match &query.filter {
                Some(filter) => DocumentEvaluator::new(data).evaluate(filter)?,
                None => true,
            };

            if keep {
                candidates.push(Candidate { collection, id, data });
            }
        }
    }

    match &query.order {
        Some(sort) => {
            let mut ordered = candidates
                .into_iter()
                .filter_map(|candidate| {
                    lookup(candidate.data, &sort.field)
                        .map(|value| (Comparable::from(value), candidate))
                })
                .collect::<Vec<_>>();

            // Ties on the ordered value fall back to the document path, in the same direction.
            ordered.sort_by(|(left, a), (right, b)| {
                let ordering = left.cmp(right).then_with(|| a.cmp_path(b));

                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });

            let after = query.start_after.as_ref().map(Comparable::from);
            let before = query.end_before.as_ref().map(Comparable::from);

            // Cursor boundaries are strict and relative to the query direction.
            let directed = |value: &Comparable<'_>, cursor: &Comparable<'_>| match sort.direction {
                SortDirection::Asc => value.cmp(cursor),
                SortDirection::Desc => cursor.cmp(value),
            };

            Ok(ordered
                .into_iter()
                .filter(|(value, _)| {
                    after
                        .as_ref()
                        .is_none_or(|cursor| directed(value, cursor) == Ordering::Greater)
                })
                .filter(|(value, _)| {
                    before
                        .as_ref()
                        .is_none_or(|cursor| directed(value, cursor) == Ordering::Less)
                })
                .map(|(_, candidate)| candidate)
                .skip(query.offset.unwrap_or(0))
                .take(query.limit.unwrap_or(usize::MAX))
                .map(into_raw)
                .collect())
        }
        None => {
            candidates.sort_by(Candidate::cmp_path);

            Ok(candidates
                .into_iter()
                .skip(query.offset.unwrap_or(0))
                .take(query.limit.unwrap_or(usize::MAX))
                .map(into_raw)
                .collect())
        }
    }
}

fn into_raw(candidate: Candidate<'_>) -> RawRecord {
    RawRecord::new(
        DocumentRef::new(candidate.collection, candidate.id),
        candidate.data.clone(),
    )
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn get_document(&self, reference: &DocumentRef) -> DocumentStoreResult<Option<RawRecord>> {
        let store = self.store.read().await;

        Ok(store
            .get(reference.collection_path())
            .and_then(|documents| documents.get(reference.id().as_str()))
            .map(|data| RawRecord::new(reference.clone(), data.clone())))
    }

    async fn set_document(&self, reference: &DocumentRef, data: Document) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .entry(reference.collection_path().to_string())
            .or_default()
            .insert(reference.id().to_string(), data);

        trace!(document = %reference, "stored document");

        Ok(())
    }

    async fn add_document(&self, collection: &str, data: Document) -> DocumentStoreResult<DocumentRef> {
        let reference = DocumentRef::new(collection, Uuid::new_v4().simple().to_string());

        self.set_document(&reference, data).await?;

        Ok(reference)
    }

    async fn delete_document(&self, reference: &DocumentRef) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if let Some(documents) = store.get_mut(reference.collection_path()) {
            documents.remove(reference.id().as_str());

            if documents.is_empty() {
                store.remove(reference.collection_path());
            }
        }

        Ok(())
    }

    async fn recursive_delete(&self, reference: &DocumentRef) -> DocumentStoreResult<()> {
        let nested = format!("{}/", reference.path());

        self.delete_document(reference).await?;
        self.store
            .write()
            .await
            .retain(|collection, _| !collection.starts_with(&nested));

        trace!(document = %reference, "deleted document tree");

        Ok(())
    }

    async fn query_documents(&self, scope: &QueryScope, query: Query) -> DocumentStoreResult<Vec<RawRecord>> {
        let store = self.store.read().await;
        let records = execute(&store, scope, &query)?;

        trace!(scope = scope.name(), returned = records.len(), "ran query");

        Ok(records)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    documents: Vec<(DocumentRef, Document)>,
}

impl InMemoryStoreBuilder {
    /// Seeds the store with a document.
    pub fn with_document(mut self, reference: DocumentRef, data: Document) -> Self {
        self.documents.push((reference, data));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = InMemoryStore::new();

        for (reference, data) in self.documents {
            store.set_document(&reference, data).await?;
        }

        Ok(store)
    }
}
