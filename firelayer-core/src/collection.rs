//! Typed facades over a collection or a collection group.
//!
//! Both facades compose the backend, a [`Mapper`] and a [`Loader`]:
//!
//! - [`Collection`] - documents of one collection path, looked up by [`StoreLocalId`]
//! - [`CollectionGroup`] - documents of every collection sharing a name, looked up by the
//!   [`GlobalUniqueKey`] their type declares
//!
//! Each facade owns its loader, so its cache lives exactly as long as the facade. Create a
//! facade per request (or unit of work) to get request-scoped caching.
//!
//! # Example
//!
//! ```ignore
//! use firelayer::prelude::*;
//!
//! let users = store.collection::<User>("users");
//! let alice = users.insert(&User { display_name: "alice".into() }).await?;
//!
//! // Served from the loader cache.
//! let again = users.find_one_by_id(alice.id().clone(), FindOptions::default()).await?;
//!
//! // Sub-collections are addressed through the parent reference.
//! let posts = store.collection::<Post>(alice.reference().collection("posts"));
//! ```

use async_trait::async_trait;
use bson::Bson;
use futures::future::join_all;
use std::{collections::HashMap, fmt, marker::PhantomData};
use tracing::debug;

use crate::{
    backend::StoreBackend,
    document::{DocumentRef, GlobalUniqueKey, GroupDocument, Mapper, RawRecord, Record, StoreLocalId},
    error::{DocumentStoreError, DocumentStoreResult},
    loader::{BatchFn, Loader, LoaderConfig},
    page::{Page, PageQuery, PageSource, PaginateInput, paginate},
    query::{Filter, Query, QueryScope},
};

/// Options for point lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindOptions {
    /// Serve the lookup from the loader cache when possible. When `false` the cached entry
    /// is cleared first, so the store is read again.
    pub cache: bool,
}

impl FindOptions {
    /// Options that bypass the cache.
    pub fn fresh() -> Self {
        Self { cache: false }
    }
}

impl Default for FindOptions {
    fn default() -> Self {
        Self { cache: true }
    }
}

/// Options for bulk queries and pagination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Seed the loader cache with every record the query returns.
    pub prime: bool,
}

impl QueryOptions {
    /// Options that prime the loader cache.
    pub fn primed() -> Self {
        Self { prime: true }
    }
}

/// Batch function of a [`Collection`]: one concurrent point read per id.
pub struct DocumentBatch<'a, B> {
    backend: &'a B,
    collection: String,
}

#[async_trait]
impl<'a, B: StoreBackend> BatchFn<StoreLocalId, RawRecord> for DocumentBatch<'a, B> {
    async fn load(&self, ids: &[StoreLocalId]) -> HashMap<StoreLocalId, DocumentStoreResult<RawRecord>> {
        join_all(ids.iter().map(|id| async move {
            let reference = DocumentRef::new(self.collection.as_str(), id.clone());
            let result = match self.backend.get_document(&reference).await {
                Ok(Some(raw)) => Ok(raw),
                Ok(None) => Err(DocumentStoreError::DocumentNotFound(
                    id.to_string(),
                    self.collection.clone(),
                )),
                Err(err) => Err(err),
            };

            (id.clone(), result)
        }))
        .await
        .into_iter()
        .collect()
    }
}

/// Batch function of a [`CollectionGroup`]: one `where key == value limit 1` query per key.
pub struct GroupBatch<'a, B> {
    backend: &'a B,
    group: String,
    key_field: &'static str,
}

#[async_trait]
impl<'a, B: StoreBackend> BatchFn<GlobalUniqueKey, RawRecord> for GroupBatch<'a, B> {
    async fn load(
        &self,
        keys: &[GlobalUniqueKey],
    ) -> HashMap<GlobalUniqueKey, DocumentStoreResult<RawRecord>> {
        let scope = QueryScope::Group(self.group.clone());

        join_all(keys.iter().map(|key| {
            let scope = &scope;
            async move {
                let query = Query::new()
                    .filter(Filter::eq(self.key_field, key.as_str()))
                    .limit(1);
                let result = self
                    .backend
                    .query_documents(scope, query)
                    .await
                    .and_then(|raws| {
                        raws.into_iter().next().ok_or_else(|| {
                            DocumentStoreError::DocumentNotFound(key.to_string(), self.group.clone())
                        })
                    });

                (key.clone(), result)
            }
        }))
        .await
        .into_iter()
        .collect()
    }
}

/// A typed view of one collection.
pub struct Collection<'a, B: StoreBackend, T, M> {
    path: String,
    backend: &'a B,
    mapper: M,
    loader: Loader<StoreLocalId, RawRecord, DocumentBatch<'a, B>>,
    _marker: PhantomData<fn() -> T>,
}

impl<B: StoreBackend, T, M> fmt::Debug for Collection<'_, B, T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("path", &self.path)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl<'a, B, T, M> Collection<'a, B, T, M>
where
    B: StoreBackend,
    T: Send + Sync,
    M: Mapper<T>,
{
    pub(crate) fn new(path: String, backend: &'a B, mapper: M, config: LoaderConfig) -> Self {
        let loader = Loader::new(DocumentBatch { backend, collection: path.clone() }, config);

        Self { path, backend, mapper, loader, _marker: PhantomData }
    }

    /// Returns the path of this collection.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn scope(&self) -> QueryScope {
        QueryScope::Collection(self.path.clone())
    }

    /// Finds a document by its store-local id.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] if no document has the id.
    pub async fn find_one_by_id(
        &self,
        id: impl Into<StoreLocalId>,
        options: FindOptions,
    ) -> DocumentStoreResult<Record<T>> {
        let id = id.into();

        if !options.cache {
            self.loader.clear(&id);
        }

        self.mapper
            .to_record(self.loader.load(id).await?)
    }

    /// Runs `query` against this collection and maps every result.
    ///
    /// With [`QueryOptions::prime`] the raw results also seed the loader cache, so a
    /// following [`find_one_by_id`](Self::find_one_by_id) is served without a store read.
    pub async fn find_many_by_query(
        &self,
        query: Query,
        options: QueryOptions,
    ) -> DocumentStoreResult<Vec<Record<T>>> {
        self.query_raw(query, options.prime)
            .await?
            .into_iter()
            .map(|raw| self.mapper.to_record(raw))
            .collect()
    }

    async fn query_raw(&self, query: Query, prime: bool) -> DocumentStoreResult<Vec<RawRecord>> {
        let raws = self
            .backend
            .query_documents(&self.scope(), query)
            .await?;

        if prime {
            for raw in &raws {
                self.loader.prime(raw.id().clone(), raw.clone());
            }
        }

        Ok(raws)
    }

    /// Fetches one page of this collection. See [`paginate`](crate::page::paginate).
    ///
    /// Cursors are read from the stored documents, so a record whose stored data lacks the
    /// cursor field fails the page even if its payload type defaults the field.
    pub async fn paginate(
        &self,
        input: PaginateInput,
        page_query: &PageQuery,
        options: QueryOptions,
    ) -> DocumentStoreResult<Page<Record<T>>> {
        let page = paginate(&input, page_query, &Pages { facade: self, prime: options.prime }).await?;

        Ok(page.map(|stored| stored.record))
    }

    /// Creates a document with a store-assigned id and returns it as stored.
    pub async fn insert(&self, data: &T) -> DocumentStoreResult<Record<T>> {
        let reference = self
            .backend
            .add_document(&self.path, self.mapper.to_document(data)?)
            .await?;

        debug!(document = %reference, "inserted document");

        self.find_one_by_id(reference.id().clone(), FindOptions::fresh())
            .await
    }

    /// Writes a document under `id`, replacing any existing one, and returns it as stored.
    pub async fn insert_with_id(
        &self,
        id: impl Into<StoreLocalId>,
        data: &T,
    ) -> DocumentStoreResult<Record<T>> {
        let reference = DocumentRef::new(self.path.as_str(), id);

        self.backend
            .set_document(&reference, self.mapper.to_document(data)?)
            .await?;

        debug!(document = %reference, "set document");

        self.find_one_by_id(reference.id().clone(), FindOptions::fresh())
            .await
    }

    /// Overwrites the stored document with the record's payload.
    pub async fn update(&self, record: &Record<T>) -> DocumentStoreResult<()> {
        self.ensure_member(record.reference())?;

        self.backend
            .set_document(record.reference(), self.mapper.to_document(record.data())?)
            .await?;
        self.loader.clear(record.id());

        debug!(document = %record.reference(), "updated document");

        Ok(())
    }

    /// Deletes the record's document. Its sub-collections are kept.
    pub async fn delete(&self, record: &Record<T>) -> DocumentStoreResult<()> {
        self.ensure_member(record.reference())?;

        self.remove(record.reference()).await
    }

    /// Deletes a document by id. Deleting a missing document succeeds.
    pub async fn delete_by_id(&self, id: impl Into<StoreLocalId>) -> DocumentStoreResult<()> {
        self.remove(&DocumentRef::new(self.path.as_str(), id))
            .await
    }

    async fn remove(&self, reference: &DocumentRef) -> DocumentStoreResult<()> {
        self.backend
            .delete_document(reference)
            .await?;
        self.loader.clear(reference.id());

        debug!(document = %reference, "deleted document");

        Ok(())
    }

    /// Deletes the record's document and every sub-collection nested under it.
    pub async fn recursive_delete(&self, record: &Record<T>) -> DocumentStoreResult<()> {
        self.ensure_member(record.reference())?;

        self.backend
            .recursive_delete(record.reference())
            .await?;
        self.loader.clear(record.id());

        debug!(document = %record.reference(), "recursively deleted document");

        Ok(())
    }

    /// Seeds the loader cache with a raw record of this collection.
    pub fn prime(&self, raw: RawRecord) -> bool {
        self.loader.prime(raw.id().clone(), raw)
    }

    /// Evicts the cached entry for `id`.
    pub fn clear(&self, id: &StoreLocalId) -> bool {
        self.loader.clear(id)
    }

    fn ensure_member(&self, reference: &DocumentRef) -> DocumentStoreResult<()> {
        if reference.collection_path() != self.path {
            return Err(DocumentStoreError::Configuration(format!(
                "document {reference} does not belong to collection {}",
                self.path,
            )));
        }

        Ok(())
    }
}

/// A typed view of every collection named [`GroupDocument::GROUP_NAME`].
///
/// Store-local ids may repeat across the collections of a group, so lookups go through the
/// type's [`GroupDocument::UNIQUE_KEY_FIELD`] instead.
pub struct CollectionGroup<'a, B: StoreBackend, T, M> {
    backend: &'a B,
    mapper: M,
    loader: Loader<GlobalUniqueKey, RawRecord, GroupBatch<'a, B>>,
    _marker: PhantomData<fn() -> T>,
}

impl<B: StoreBackend, T: GroupDocument, M> fmt::Debug for CollectionGroup<'_, B, T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionGroup")
            .field("name", &T::GROUP_NAME)
            .field("key_field", &T::UNIQUE_KEY_FIELD)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl<'a, B, T, M> CollectionGroup<'a, B, T, M>
where
    B: StoreBackend,
    T: GroupDocument + Send + Sync,
    M: Mapper<T>,
{
    pub(crate) fn new(backend: &'a B, mapper: M, config: LoaderConfig) -> Self {
        let batch = GroupBatch {
            backend,
            group: T::GROUP_NAME.to_string(),
            key_field: T::UNIQUE_KEY_FIELD,
        };

        Self { backend, mapper, loader: Loader::new(batch, config), _marker: PhantomData }
    }

    /// Returns the collection group name.
    pub fn name(&self) -> &'static str {
        T::GROUP_NAME
    }

    fn scope(&self) -> QueryScope {
        QueryScope::Group(T::GROUP_NAME.to_string())
    }

    /// Finds a document by its unique key.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] if no document of the group carries
    /// the key.
    pub async fn find_one_by_id(
        &self,
        key: impl Into<GlobalUniqueKey>,
        options: FindOptions,
    ) -> DocumentStoreResult<Record<T>> {
        let key = key.into();

        if !options.cache {
            self.loader.clear(&key);
        }

        self.mapper
            .to_record(self.loader.load(key).await?)
    }

    /// Runs `query` against the whole group and maps every result.
    ///
    /// # Errors
    ///
    /// With [`QueryOptions::prime`], returns [`DocumentStoreError::Configuration`] if a
    /// result does not carry a string unique key.
    pub async fn find_many_by_query(
        &self,
        query: Query,
        options: QueryOptions,
    ) -> DocumentStoreResult<Vec<Record<T>>> {
        self.query_raw(query, options.prime)
            .await?
            .into_iter()
            .map(|raw| self.mapper.to_record(raw))
            .collect()
    }

    async fn query_raw(&self, query: Query, prime: bool) -> DocumentStoreResult<Vec<RawRecord>> {
        let raws = self
            .backend
            .query_documents(&self.scope(), query)
            .await?;

        if prime {
            for raw in &raws {
                self.loader
                    .prime(raw.unique_key(T::UNIQUE_KEY_FIELD)?, raw.clone());
            }
        }

        Ok(raws)
    }

    /// Fetches one page of the group. See [`paginate`](crate::page::paginate).
    pub async fn paginate(
        &self,
        input: PaginateInput,
        page_query: &PageQuery,
        options: QueryOptions,
    ) -> DocumentStoreResult<Page<Record<T>>> {
        let page = paginate(&input, page_query, &Pages { facade: self, prime: options.prime }).await?;

        Ok(page.map(|stored| stored.record))
    }

    /// Seeds the loader cache with a raw record of the group.
    pub fn prime(&self, raw: RawRecord) -> DocumentStoreResult<bool> {
        Ok(self
            .loader
            .prime(raw.unique_key(T::UNIQUE_KEY_FIELD)?, raw))
    }

    /// Evicts the cached entry for `key`.
    pub fn clear(&self, key: &GlobalUniqueKey) -> bool {
        self.loader.clear(key)
    }
}

/// Adapts a facade to the paginator.
struct Pages<'f, F> {
    facade: &'f F,
    prime: bool,
}

/// A mapped record paired with the data it was mapped from. Cursors come from the latter.
struct Stored<T> {
    raw: RawRecord,
    record: Record<T>,
}

fn stored<T, M: Mapper<T>>(mapper: &M, raws: Vec<RawRecord>) -> DocumentStoreResult<Vec<Stored<T>>> {
    raws.into_iter()
        .map(|raw| {
            Ok(Stored {
                record: mapper.to_record(raw.clone())?,
                raw,
            })
        })
        .collect()
}

#[async_trait]
impl<'f, 'a, B, T, M> PageSource for Pages<'f, Collection<'a, B, T, M>>
where
    B: StoreBackend,
    T: Send + Sync,
    M: Mapper<T>,
{
    type Node = Stored<T>;

    async fn fetch(&self, query: Query, primary: bool) -> DocumentStoreResult<Vec<Stored<T>>> {
        let raws = self
            .facade
            .query_raw(query, primary && self.prime)
            .await?;

        stored(&self.facade.mapper, raws)
    }

    fn cursor_value(&self, node: &Stored<T>, field: &str) -> DocumentStoreResult<Option<Bson>> {
        Ok(node.raw.get(field).cloned())
    }

    fn describe(&self, node: &Stored<T>) -> String {
        node.raw.reference.to_string()
    }
}

#[async_trait]
impl<'f, 'a, B, T, M> PageSource for Pages<'f, CollectionGroup<'a, B, T, M>>
where
    B: StoreBackend,
    T: GroupDocument + Send + Sync,
    M: Mapper<T>,
{
    type Node = Stored<T>;

    async fn fetch(&self, query: Query, primary: bool) -> DocumentStoreResult<Vec<Stored<T>>> {
        let raws = self
            .facade
            .query_raw(query, primary && self.prime)
            .await?;

        stored(&self.facade.mapper, raws)
    }

    fn cursor_value(&self, node: &Stored<T>, field: &str) -> DocumentStoreResult<Option<Bson>> {
        Ok(node.raw.get(field).cloned())
    }

    fn describe(&self, node: &Stored<T>) -> String {
        node.raw.reference.to_string()
    }
}
