//! Main document store interface.
//!
//! [`DocumentStore`] owns a backend and hands out typed facades bound to it:
//!
//! - [`DocumentStore::collection`] - a [`Collection`] over one collection path
//! - [`DocumentStore::collection_group`] - a [`CollectionGroup`] over every collection of a group
//!
//! Every facade gets a fresh loader configured with the store's [`LoaderConfig`].
//!
//! # Example
//!
//! ```ignore
//! use firelayer::prelude::*;
//!
//! let store = DocumentStore::new(InMemoryStore::new())
//!     .with_loader_config(LoaderConfig::builder().with_max_batch_size(100).build());
//!
//! let users = store.collection::<User>("users");
//! let posts = store.collection_group::<Post>();
//! ```

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    backend::StoreBackend,
    collection::{Collection, CollectionGroup},
    document::{GroupDocument, Mapper, SerdeMapper},
    error::DocumentStoreResult,
    loader::LoaderConfig,
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    loader_config: LoaderConfig,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend and the default loader settings.
    pub fn new(backend: B) -> Self {
        Self { backend, loader_config: LoaderConfig::default() }
    }

    /// Replaces the loader settings used by facades created from now on.
    pub fn with_loader_config(mut self, loader_config: LoaderConfig) -> Self {
        self.loader_config = loader_config;
        self
    }

    pub fn loader_config(&self) -> &LoaderConfig {
        &self.loader_config
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a collection facade mapping documents through their `serde` implementations.
    ///
    /// # Arguments
    ///
    /// * `path` - The full collection path, e.g. `users` or `users/u1/posts`
    pub fn collection<T>(&self, path: impl Into<String>) -> Collection<'_, B, T, SerdeMapper<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        self.collection_with(path, SerdeMapper::new())
    }

    /// Gets a collection facade using a custom mapper.
    pub fn collection_with<T, M>(&self, path: impl Into<String>, mapper: M) -> Collection<'_, B, T, M>
    where
        T: Send + Sync,
        M: Mapper<T>,
    {
        Collection::new(path.into(), &self.backend, mapper, self.loader_config.clone())
    }

    /// Gets a collection group facade for `T`.
    ///
    /// The group name and the unique key field come from `T`'s [`GroupDocument`] impl.
    pub fn collection_group<T>(&self) -> CollectionGroup<'_, B, T, SerdeMapper<T>>
    where
        T: GroupDocument + Serialize + DeserializeOwned + Send + Sync,
    {
        self.collection_group_with(SerdeMapper::new())
    }

    /// Gets a collection group facade using a custom mapper.
    pub fn collection_group_with<T, M>(&self, mapper: M) -> CollectionGroup<'_, B, T, M>
    where
        T: GroupDocument + Send + Sync,
        M: Mapper<T>,
    {
        CollectionGroup::new(&self.backend, mapper, self.loader_config.clone())
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown operation fails.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}
