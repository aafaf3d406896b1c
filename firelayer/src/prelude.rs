//! Convenient re-exports of commonly used types from firelayer.
//!
//! ```ignore
//! use firelayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - Records, identifiers and mappers
//! - Store backends and builders
//! - Query construction and filtering
//! - Pagination and loader types
//! - Collection facades and error types

pub use firelayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, CollectionGroup, FindOptions, QueryOptions},
    document::{DocumentRef, GlobalUniqueKey, GroupDocument, Mapper, RawRecord, Record, SerdeMapper, StoreLocalId},
    error::{DocumentStoreError, DocumentStoreResult},
    loader::{BatchFn, Loader, LoaderConfig},
    page::{Cursor, Edge, Page, PageInfo, PageQuery, PaginateInput},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryScope, QueryVisitor, Sort, SortDirection},
    store::DocumentStore,
};
pub use firelayer_memory::InMemoryStore;
