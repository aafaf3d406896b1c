//! In-memory document storage backend for firelayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait
//! with Firestore-like query semantics. It is meant for development and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Hierarchical paths** - Sub-collections nested under documents, collection group queries
//! - **Ordered queries** - Filters, ordering with path tie-break, strict cursor boundaries
//!
//! # Quick Start
//!
//! ```ignore
//! use firelayer::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!     let users = store.collection::<User>("users");
//!
//!     let alice = users.insert(&User { name: "Alice".to_string() }).await?;
//!     println!("{}", alice.reference());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as firelayer_memory;

pub mod store;
mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
