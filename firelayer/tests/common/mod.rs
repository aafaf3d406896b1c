#![allow(dead_code)]

use async_trait::async_trait;
use bson::{DateTime, Document};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use firelayer::{
    memory::InMemoryStore,
    prelude::*,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime,
}

impl User {
    pub fn on_day(day: u32) -> Self {
        Self {
            display_name: format!("user-{day}"),
            created_at: DateTime::from_chrono(
                Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "__id")]
    pub key: String,
    pub title: String,
}

impl GroupDocument for Post {
    const GROUP_NAME: &'static str = "posts";
    const UNIQUE_KEY_FIELD: &'static str = "__id";
}

/// In-memory backend counting the round-trips facades make.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryStore,
    gets: AtomicUsize,
    queries: AtomicUsize,
}

impl CountingStore {
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.queries.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreBackend for CountingStore {
    async fn get_document(&self, reference: &DocumentRef) -> DocumentStoreResult<Option<RawRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_document(reference).await
    }

    async fn set_document(&self, reference: &DocumentRef, data: Document) -> DocumentStoreResult<()> {
        self.inner.set_document(reference, data).await
    }

    async fn add_document(&self, collection: &str, data: Document) -> DocumentStoreResult<DocumentRef> {
        self.inner.add_document(collection, data).await
    }

    async fn delete_document(&self, reference: &DocumentRef) -> DocumentStoreResult<()> {
        self.inner.delete_document(reference).await
    }

    async fn recursive_delete(&self, reference: &DocumentRef) -> DocumentStoreResult<()> {
        self.inner.recursive_delete(reference).await
    }

    async fn query_documents(&self, scope: &QueryScope, query: Query) -> DocumentStoreResult<Vec<RawRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query_documents(scope, query).await
    }
}

pub fn counting_store() -> DocumentStore<CountingStore> {
    DocumentStore::new(CountingStore::default())
}

/// Stores users `u01`..`u{days}`, created on consecutive days of January 2024.
pub async fn seed_users(store: &DocumentStore<CountingStore>, days: u32) {
    let users = store.collection::<User>("users");

    for day in 1..=days {
        users
            .insert_with_id(format!("u{day:02}"), &User::on_day(day))
            .await
            .unwrap();
    }

    store.backend().reset();
}

pub fn names(page: &Page<Record<User>>) -> Vec<String> {
    page.nodes()
        .map(|user| user.data().display_name.clone())
        .collect()
}

pub fn by_creation() -> PageQuery {
    PageQuery::from_forward(Query::new().order_by("createdAt", SortDirection::Asc), "createdAt")
        .unwrap()
}
