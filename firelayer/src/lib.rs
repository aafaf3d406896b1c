//! Main firelayer crate providing typed access to ordered document stores.
//!
//! This crate is the primary entry point for users of firelayer. It re-exports the core
//! types from `firelayer-core` and the bundled in-memory backend.
//!
//! # Features
//!
//! - **Typed collections** - Map stored documents to your own types through a [`document::Mapper`]
//! - **Cursor pagination** - Relay-style pages with accurate `has_next_page` / `has_previous_page`
//! - **Batched lookups** - Point lookups issued in the same turn share one round of store reads
//! - **Collection groups** - Look up documents across every collection sharing a name
//!
//! # Quick Start
//!
//! ```ignore
//! use firelayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "displayName")]
//!     pub display_name: String,
//!     #[serde(rename = "createdAt")]
//!     pub created_at: bson::DateTime,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let users = store.collection::<User>("users");
//!
//!     let alice = users
//!         .insert(&User { display_name: "alice".into(), created_at: bson::DateTime::now() })
//!         .await?;
//!
//!     // Both lookups are coalesced into a single store read.
//!     let (a, b) = futures::try_join!(
//!         users.find_one_by_id(alice.id().clone(), FindOptions::default()),
//!         users.find_one_by_id(alice.id().clone(), FindOptions::default()),
//!     )?;
//!
//!     let page_query = PageQuery::from_forward(
//!         Query::new().order_by("createdAt", SortDirection::Asc),
//!         "createdAt",
//!     )?;
//!     let page = users
//!         .paginate(PaginateInput::forward(10, None), &page_query, QueryOptions::primed())
//!         .await?;
//!
//!     println!("{} users, more: {}", page.edges.len(), page.page_info.has_next_page);
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Collection groups
//!
//! Types stored in sub-collections that share a name declare how they are identified across
//! the group:
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Post {
//!     #[serde(rename = "__id")]
//!     pub key: String,
//!     pub title: String,
//! }
//!
//! impl GroupDocument for Post {
//!     const GROUP_NAME: &'static str = "posts";
//!     const UNIQUE_KEY_FIELD: &'static str = "__id";
//! }
//!
//! let posts = store.collection_group::<Post>();
//! let post = posts.find_one_by_id("post-1", FindOptions::default()).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing

pub mod prelude;

pub use firelayer_core::{backend, collection, document, error, loader, page, query, store};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use firelayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}
