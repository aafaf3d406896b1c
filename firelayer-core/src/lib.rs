//! A thin typed document layer over ordered, Firestore-like document stores.
//!
//! This crate is the core of the firelayer project and provides:
//!
//! - **Records and mapping** ([`document`]) - Identifier kinds, raw and typed records, the mapper capability
//! - **Store backend abstraction** ([`backend`]) - The keyed store and ordered query source facades are built on
//! - **Query and filtering API** ([`query`]) - Ordered queries with cursor boundaries
//! - **Cursor pagination** ([`page`]) - Relay-style pages over ordered queries
//! - **Batch loading** ([`loader`]) - Coalesced, cached point lookups
//! - **Collections interface** ([`collection`]) - Typed collection and collection group facades
//! - **Document store** ([`store`]) - Entry point handing out facades
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use firelayer::prelude::*;
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
//! let store = DocumentStore::new(InMemoryStore::new());
//! let users = store.collection::<User>("users");
//!
//! let query = Query::new().order_by("createdAt", SortDirection::Asc);
//! let page = users
//!     .paginate(PaginateInput::forward(10, None), &PageQuery::from_forward(query, "createdAt")?, QueryOptions::primed())
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as firelayer_core;

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod loader;
pub mod page;
pub mod query;
pub mod store;
