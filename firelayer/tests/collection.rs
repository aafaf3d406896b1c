mod common;

use bson::Bson;
use firelayer::prelude::*;
use serde::{Deserialize, Serialize};

use common::{User, by_creation, counting_store, names, seed_users};

#[tokio::test]
async fn insert_returns_the_stored_record() {
    let store = counting_store();
    let users = store.collection::<User>("users");

    let alice = users.insert(&User::on_day(1)).await.unwrap();

    assert!(!alice.id().as_str().is_empty());
    assert_eq!(alice.reference().collection_path(), "users");
    assert_eq!(alice.data(), &User::on_day(1));

    let bob = users
        .insert_with_id("bob", &User::on_day(2))
        .await
        .unwrap();

    assert_eq!(bob.reference().path(), "users/bob");
    assert_eq!(bob.data().display_name, "user-2");
}

#[tokio::test]
async fn missing_documents_are_not_found() {
    let store = counting_store();
    let users = store.collection::<User>("users");

    let err = users
        .find_one_by_id("nobody", FindOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(
        err,
        DocumentStoreError::DocumentNotFound("nobody".to_string(), "users".to_string()),
    );
}

#[tokio::test]
async fn concurrent_lookups_share_one_read_per_id() {
    let store = counting_store();
    seed_users(&store, 3).await;
    let users = store.collection::<User>("users");

    let (a, b, again) = futures::try_join!(
        users.find_one_by_id("u01", FindOptions::default()),
        users.find_one_by_id("u02", FindOptions::default()),
        users.find_one_by_id("u01", FindOptions::default()),
    )
    .unwrap();

    assert_eq!(a.data().display_name, "user-1");
    assert_eq!(b.data().display_name, "user-2");
    assert_eq!(a, again);
    assert_eq!(store.backend().gets(), 2);
}

#[tokio::test]
async fn cached_lookups_skip_the_store_unless_bypassed() {
    let store = counting_store();
    seed_users(&store, 1).await;
    let users = store.collection::<User>("users");

    users.find_one_by_id("u01", FindOptions::default()).await.unwrap();
    users.find_one_by_id("u01", FindOptions::default()).await.unwrap();
    assert_eq!(store.backend().gets(), 1);

    users.find_one_by_id("u01", FindOptions::fresh()).await.unwrap();
    assert_eq!(store.backend().gets(), 2);
}

#[tokio::test]
async fn fresh_lookups_see_writes_behind_the_cache() {
    let store = counting_store();
    seed_users(&store, 1).await;
    let users = store.collection::<User>("users");

    users.find_one_by_id("u01", FindOptions::default()).await.unwrap();

    // Written through another facade, so this one's cache still holds the old payload.
    store
        .collection::<User>("users")
        .insert_with_id("u01", &User::on_day(9))
        .await
        .unwrap();

    let cached = users
        .find_one_by_id("u01", FindOptions::default())
        .await
        .unwrap();
    assert_eq!(cached.data().display_name, "user-1");

    let fresh = users
        .find_one_by_id("u01", FindOptions::fresh())
        .await
        .unwrap();
    assert_eq!(fresh.data(), &User::on_day(9));

    // The fresh read replaces the cached entry.
    let after = users
        .find_one_by_id("u01", FindOptions::default())
        .await
        .unwrap();
    assert_eq!(after.data().display_name, "user-9");
}

#[tokio::test]
async fn failed_lookups_are_retried() {
    let store = counting_store();
    let users = store.collection::<User>("users");

    assert!(users.find_one_by_id("late", FindOptions::default()).await.is_err());

    store
        .collection::<User>("users")
        .insert_with_id("late", &User::on_day(4))
        .await
        .unwrap();

    let late = users
        .find_one_by_id("late", FindOptions::default())
        .await
        .unwrap();
    assert_eq!(late.data().display_name, "user-4");
}

#[tokio::test]
async fn primed_queries_serve_later_lookups() {
    let store = counting_store();
    seed_users(&store, 4).await;
    let users = store.collection::<User>("users");

    let recent = users
        .find_many_by_query(
            Query::new().filter(Filter::gte("createdAt", User::on_day(3).created_at)),
            QueryOptions::primed(),
        )
        .await
        .unwrap();
    assert_eq!(recent.len(), 2);

    for user in &recent {
        users
            .find_one_by_id(user.id().clone(), FindOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(store.backend().gets(), 0);

    // Without priming every lookup reads the store.
    let unprimed = store.collection::<User>("users");
    unprimed
        .find_many_by_query(Query::new(), QueryOptions::default())
        .await
        .unwrap();
    unprimed
        .find_one_by_id("u01", FindOptions::default())
        .await
        .unwrap();
    assert_eq!(store.backend().gets(), 1);
}

#[tokio::test]
async fn forward_pages_walk_the_collection() {
    let store = counting_store();
    seed_users(&store, 10).await;
    let users = store.collection::<User>("users");
    let page_query = by_creation();

    let first = users
        .paginate(PaginateInput::forward(3, None), &page_query, QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(names(&first), ["user-1", "user-2", "user-3"]);
    assert!(first.page_info.has_next_page);
    assert!(!first.page_info.has_previous_page);
    assert_eq!(
        first.page_info.start_cursor,
        Some(Cursor::new(User::on_day(1).created_at)),
    );
    // One page read plus two existence checks.
    assert_eq!(store.backend().queries(), 3);

    let mut seen = names(&first);
    let mut after = first.page_info.end_cursor.clone();
    let mut pages = 1;

    loop {
        let page = users
            .paginate(PaginateInput::forward(3, after.clone()), &page_query, QueryOptions::default())
            .await
            .unwrap();

        assert!(page.page_info.has_previous_page);
        seen.extend(names(&page));
        pages += 1;

        if !page.page_info.has_next_page {
            assert_eq!(names(&page), ["user-10"]);
            break;
        }

        after = page.page_info.end_cursor;
    }

    assert_eq!(pages, 4);
    assert_eq!(seen, (1..=10).map(|day| format!("user-{day}")).collect::<Vec<_>>());
}

#[tokio::test]
async fn backward_pages_mirror_forward_pages() {
    let store = counting_store();
    seed_users(&store, 10).await;
    let users = store.collection::<User>("users");
    let page_query = by_creation();

    let tail = users
        .paginate(PaginateInput::backward(3, None), &page_query, QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(names(&tail), ["user-8", "user-9", "user-10"]);
    assert!(!tail.page_info.has_next_page);
    assert!(tail.page_info.has_previous_page);

    let previous = users
        .paginate(
            PaginateInput::backward(3, tail.page_info.start_cursor.clone()),
            &page_query,
            QueryOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(names(&previous), ["user-5", "user-6", "user-7"]);
    assert!(previous.page_info.has_next_page);
    assert!(previous.page_info.has_previous_page);

    // Paging forward from the previous page lands back on the tail.
    let forward = users
        .paginate(
            PaginateInput::forward(3, previous.page_info.end_cursor.clone()),
            &page_query,
            QueryOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(forward.edges, tail.edges);
}

#[tokio::test]
async fn pages_of_two_are_symmetric() {
    let store = counting_store();
    seed_users(&store, 10).await;
    let users = store.collection::<User>("users");
    let page_query = by_creation();

    let mut after = None;
    let mut forward = Vec::new();
    for _ in 0..3 {
        let page = users
            .paginate(PaginateInput::forward(2, after), &page_query, QueryOptions::default())
            .await
            .unwrap();
        after = page.page_info.end_cursor.clone();
        forward.push(page);
    }

    assert_eq!(names(&forward[0]), ["user-1", "user-2"]);
    assert_eq!(names(&forward[1]), ["user-3", "user-4"]);
    assert_eq!(names(&forward[2]), ["user-5", "user-6"]);

    let before_fifth = users
        .paginate(
            PaginateInput::backward(2, forward[2].page_info.start_cursor.clone()),
            &page_query,
            QueryOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(before_fifth.edges, forward[1].edges);
    assert_eq!(before_fifth.page_info, forward[1].page_info);

    let tail = users
        .paginate(PaginateInput::backward(2, None), &page_query, QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(names(&tail), ["user-9", "user-10"]);
}

#[tokio::test]
async fn zero_sized_pages_are_empty() {
    let store = counting_store();
    seed_users(&store, 3).await;
    let users = store.collection::<User>("users");

    let page = users
        .paginate(PaginateInput::forward(0, None), &by_creation(), QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(page, Page::default());
    assert_eq!(store.backend().queries(), 1);
}

#[tokio::test]
async fn unbounded_page_returns_everything() {
    let store = counting_store();
    seed_users(&store, 5).await;
    let users = store.collection::<User>("users");

    let page = users
        .paginate(PaginateInput::default(), &by_creation(), QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(page.edges.len(), 5);
    assert!(!page.page_info.has_next_page);
    assert!(!page.page_info.has_previous_page);
    assert_eq!(
        page.page_info.end_cursor.map(Cursor::into_inner),
        Some(Bson::DateTime(User::on_day(5).created_at)),
    );
}

#[tokio::test]
async fn primed_pages_serve_later_lookups() {
    let store = counting_store();
    seed_users(&store, 5).await;
    let users = store.collection::<User>("users");

    let page = users
        .paginate(PaginateInput::forward(2, None), &by_creation(), QueryOptions::primed())
        .await
        .unwrap();

    for user in page.nodes() {
        users
            .find_one_by_id(user.id().clone(), FindOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(store.backend().gets(), 0);

    // Existence checks never prime the cache.
    users
        .find_one_by_id("u03", FindOptions::default())
        .await
        .unwrap();
    assert_eq!(store.backend().gets(), 1);
}

#[tokio::test]
async fn cursor_field_must_be_present_on_every_node() {
    let store = counting_store();
    seed_users(&store, 2).await;
    let users = store.collection::<User>("users");
    let page_query = PageQuery::from_forward(
        Query::new().order_by("createdAt", SortDirection::Asc),
        "nickname",
    )
    .unwrap();

    let err = users
        .paginate(PaginateInput::forward(1, None), &page_query, QueryOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DocumentStoreError::MissingCursorField("nickname".to_string(), "users/u01".to_string()),
    );
}

#[tokio::test]
async fn writes_clear_the_cached_entry() {
    let store = counting_store();
    seed_users(&store, 2).await;
    let users = store.collection::<User>("users");

    let mut first = users
        .find_one_by_id("u01", FindOptions::default())
        .await
        .unwrap();
    first.data_mut().display_name = "renamed".to_string();
    users.update(&first).await.unwrap();

    let reread = users
        .find_one_by_id("u01", FindOptions::default())
        .await
        .unwrap();
    assert_eq!(reread.data().display_name, "renamed");
    assert_eq!(store.backend().gets(), 2);

    users.delete(&reread).await.unwrap();
    assert!(
        users
            .find_one_by_id("u01", FindOptions::default())
            .await
            .unwrap_err()
            .is_not_found()
    );

    users.delete_by_id("u01").await.unwrap();
    users.delete_by_id("u02").await.unwrap();
    assert_eq!(store.backend().inner().count("users").await, 0);
}

#[tokio::test]
async fn records_are_bound_to_their_collection() {
    let store = counting_store();
    seed_users(&store, 1).await;

    let user = store
        .collection::<User>("users")
        .find_one_by_id("u01", FindOptions::default())
        .await
        .unwrap();

    let err = store
        .collection::<User>("admins")
        .update(&user)
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::Configuration(_)));
}

#[tokio::test]
async fn deleting_a_foreign_record_leaves_both_collections_intact() {
    let store = counting_store();
    seed_users(&store, 1).await;
    let admins = store.collection::<User>("admins");
    admins.insert_with_id("u01", &User::on_day(2)).await.unwrap();

    let user = store
        .collection::<User>("users")
        .find_one_by_id("u01", FindOptions::default())
        .await
        .unwrap();

    let err = admins.delete(&user).await.unwrap_err();

    assert!(matches!(err, DocumentStoreError::Configuration(_)));
    assert_eq!(store.backend().inner().count("admins").await, 1);
    assert_eq!(store.backend().inner().count("users").await, 1);

    store
        .collection::<User>("users")
        .delete(&user)
        .await
        .unwrap();
    assert_eq!(store.backend().inner().count("users").await, 0);
    assert_eq!(store.backend().inner().count("admins").await, 1);
}

/// A view of stored users that models an optional field they never carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    #[serde(rename = "displayName")]
    display_name: String,
    nickname: Option<String>,
}

#[tokio::test]
async fn cursors_come_from_stored_data_not_payload_defaults() {
    let store = counting_store();
    seed_users(&store, 1).await;
    let profiles = store.collection::<Profile>("users");
    let page_query = PageQuery::from_forward(
        Query::new().order_by("createdAt", SortDirection::Asc),
        "nickname",
    )
    .unwrap();

    let err = profiles
        .paginate(PaginateInput::forward(5, None), &page_query, QueryOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DocumentStoreError::MissingCursorField("nickname".to_string(), "users/u01".to_string()),
    );
}

#[tokio::test]
async fn stored_nulls_are_valid_cursors() {
    let store = counting_store();
    store
        .backend()
        .set_document(
            &DocumentRef::new("users", "u01"),
            bson::doc! { "displayName": "user-1", "nickname": Bson::Null },
        )
        .await
        .unwrap();
    let profiles = store.collection::<Profile>("users");
    let page_query = PageQuery::from_forward(
        Query::new().order_by("nickname", SortDirection::Asc),
        "nickname",
    )
    .unwrap();

    let page = profiles
        .paginate(PaginateInput::forward(5, None), &page_query, QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(page.edges.len(), 1);
    assert_eq!(page.page_info.end_cursor, Some(Cursor::new(Bson::Null)));
    assert!(!page.page_info.has_next_page);
    assert!(!page.page_info.has_previous_page);
}

#[tokio::test]
async fn recursive_delete_removes_sub_collections() {
    let store = counting_store();
    let users = store.collection::<User>("users");
    let alice = users.insert(&User::on_day(1)).await.unwrap();

    let notes = store.collection::<User>(alice.reference().collection("notes"));
    notes.insert(&User::on_day(2)).await.unwrap();
    assert_eq!(store.backend().inner().count(notes.path()).await, 1);

    users.recursive_delete(&alice).await.unwrap();

    assert_eq!(store.backend().inner().count(notes.path()).await, 0);
    assert!(
        users
            .find_one_by_id(alice.id().clone(), FindOptions::default())
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn records_project_to_json() {
    let store = counting_store();
    seed_users(&store, 1).await;

    let user = store
        .collection::<User>("users")
        .find_one_by_id("u01", FindOptions::default())
        .await
        .unwrap();
    let json = user.to_json().unwrap();

    assert_eq!(json["displayName"], "user-1");
    assert!(json.get("id").is_none());
}
