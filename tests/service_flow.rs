//! End-to-end contract of the item service: store first, index after, and
//! index trouble surfaced alongside the write result, never instead of it.

mod common;

use common::RecordingClient;
use itemhub::model::types::{NewComment, NewItem};
use itemhub::search::tantivy::TantivyIndexClient;
use itemhub::storage::sqlite::SqliteStorage;
use itemhub::{Error, IndexSynchronizer, ItemPatch, ItemService, RawQuery};

fn new_item(title: &str, owner: &str) -> NewItem {
    NewItem {
        title: title.into(),
        description: Some(format!("{title} spotted near the station")),
        owner: owner.into(),
        images: vec![],
        comments: vec![],
    }
}

fn service_with_recorder() -> (ItemService, RecordingClient) {
    common::init_tracing();
    let storage = SqliteStorage::open_in_memory().expect("open store");
    let client = RecordingClient::default();
    let service = ItemService::new(storage, IndexSynchronizer::new(Box::new(client.clone())));
    (service, client)
}

#[test]
fn create_upserts_the_full_document_once() {
    let (mut service, client) = service_with_recorder();

    let outcome = service.create(new_item("Blue lamp", "u1")).unwrap();
    assert!(outcome.index.is_applied());

    let upserts = client.upserts();
    assert_eq!(upserts.len(), 1);
    let (index, doc) = &upserts[0];
    assert_eq!(index, "items");
    assert_eq!(doc.id, outcome.item.id.unwrap().to_string());
    assert_eq!(doc.title, "Blue lamp");
    assert_eq!(doc.owner, "u1");
    assert_eq!(doc.created_at, outcome.item.created_at);
}

#[test]
fn validation_failure_touches_neither_store_nor_index() {
    let (mut service, client) = service_with_recorder();

    let result = service.create(new_item("   ", "u1"));
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(client.call_count(), 0);
    assert!(service.list(RawQuery::new()).unwrap().is_empty());
}

#[test]
fn store_failure_on_create_makes_zero_index_calls() {
    let storage = SqliteStorage::open_in_memory().expect("open store");
    storage
        .raw()
        .execute_batch("DROP TABLE comments; DROP TABLE items;")
        .unwrap();
    let client = RecordingClient::default();
    let mut service = ItemService::new(storage, IndexSynchronizer::new(Box::new(client.clone())));

    let result = service.create(new_item("Blue lamp", "u1"));
    assert!(matches!(result, Err(Error::Store(_))));
    assert_eq!(client.call_count(), 0);
}

#[test]
fn index_failure_leaves_the_write_durable() {
    let (mut service, client) = service_with_recorder();
    client.set_failing(true);

    let outcome = service.create(new_item("Blue lamp", "u1")).unwrap();
    let failure = outcome.index.failure().expect("index failure surfaced");
    assert_eq!(failure.doc_id, outcome.item.id.unwrap().to_string());

    // The item is durable regardless of the index.
    let id = outcome.item.id.unwrap();
    assert_eq!(service.get(id).unwrap().title, "Blue lamp");
}

#[test]
fn update_upserts_the_new_document_and_misses_are_not_found() {
    let (mut service, client) = service_with_recorder();

    let missing = service.update(42, ItemPatch::default());
    assert!(matches!(missing, Err(Error::NotFound(42))));
    assert_eq!(client.call_count(), 0);

    let created = service.create(new_item("Blue lamp", "u1")).unwrap();
    let id = created.item.id.unwrap();
    let updated = service
        .update(
            id,
            ItemPatch {
                title: Some("Red lamp".into()),
                ..ItemPatch::default()
            },
        )
        .unwrap();
    assert!(updated.index.is_applied());

    let upserts = client.upserts();
    assert_eq!(upserts.len(), 2);
    assert_eq!(upserts[1].1.title, "Red lamp");
    assert_eq!(upserts[1].1.owner, "u1");
}

#[test]
fn delete_removes_from_index_once_then_reports_not_found() {
    let (mut service, client) = service_with_recorder();

    let created = service.create(new_item("Blue lamp", "u1")).unwrap();
    let id = created.item.id.unwrap();

    let outcome = service.delete(id).unwrap();
    assert!(outcome.index.is_applied());
    assert_eq!(client.deletes(), vec![("items".to_string(), id.to_string())]);

    let again = service.delete(id);
    assert!(matches!(again, Err(Error::NotFound(_))));
    // The failed delete never reached the index.
    assert_eq!(client.deletes().len(), 1);
}

#[test]
fn deleting_a_never_indexed_item_is_skipped_not_failed() {
    let storage = SqliteStorage::open_in_memory().expect("open store");
    // Seed behind the service's back so the index never saw the row.
    storage
        .raw()
        .execute(
            "INSERT INTO items (title, owner, created_at, updated_at) VALUES (?, ?, ?, ?)",
            ("Ghost", "u1", 1_i64, 1_i64),
        )
        .unwrap();
    let client = RecordingClient::default();
    let mut service = ItemService::new(storage, IndexSynchronizer::new(Box::new(client.clone())));

    let outcome = service.delete(1).unwrap();
    assert!(outcome.index.is_skipped());
    assert_eq!(outcome.item.title, "Ghost");
}

#[test]
fn owner_scoped_listing_is_newest_first_and_bounded() {
    let (mut service, _client) = service_with_recorder();

    for i in 0..7 {
        service.create(new_item(&format!("u1 item {i}"), "u1")).unwrap();
        if i < 3 {
            service.create(new_item(&format!("u2 item {i}"), "u2")).unwrap();
        }
    }

    let docs = service
        .list(RawQuery::from_pairs([
            ("owner", "u1"),
            ("page", "1"),
            ("limit", "5"),
        ]))
        .unwrap();
    assert_eq!(docs.len(), 5);
    for doc in &docs {
        assert_eq!(doc["owner"], serde_json::json!("u1"));
    }
    let ids: Vec<i64> = docs.iter().map(|d| d["id"].as_i64().unwrap()).collect();
    let mut newest_first = ids.clone();
    newest_first.sort_by(|a, b| b.cmp(a));
    assert_eq!(ids, newest_first, "expected newest-first ordering");

    // Second page holds the remaining two u1 items.
    let rest = service
        .list_for_owner("u1", RawQuery::from_pairs([("page", "2"), ("limit", "5")]))
        .unwrap();
    assert_eq!(rest.len(), 2);
}

#[test]
fn date_range_listing_is_inclusive() {
    let storage = SqliteStorage::open_in_memory().expect("open store");
    let rows: &[(&str, i64)] = &[
        ("before", 1_704_067_199_999), // 2023-12-31T23:59:59.999Z
        ("january", 1_705_000_000_000),
        ("after", 1_706_745_600_000), // 2024-02-01T00:00:00.000Z
    ];
    for (title, created_at) in rows {
        storage
            .raw()
            .execute(
                "INSERT INTO items (title, owner, created_at, updated_at) VALUES (?, ?, ?, ?)",
                (title, "u1", created_at, created_at),
            )
            .unwrap();
    }
    let client = RecordingClient::default();
    let service = ItemService::new(storage, IndexSynchronizer::new(Box::new(client)));

    let docs = service
        .list(RawQuery::from_pairs([
            ("startDate", "2024-01-01"),
            ("endDate", "2024-01-31"),
        ]))
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["title"], serde_json::json!("january"));
}

#[test]
fn comments_attach_to_existing_items_only() {
    let (mut service, _client) = service_with_recorder();
    let created = service.create(new_item("Blue lamp", "u1")).unwrap();
    let id = created.item.id.unwrap();

    let comment = service
        .add_comment(
            id,
            NewComment {
                author: "u2".into(),
                body: "seen one like this".into(),
            },
        )
        .unwrap();
    assert!(comment.id.is_some());
    assert_eq!(service.get(id).unwrap().comments.len(), 1);

    let missing = service.add_comment(
        999,
        NewComment {
            author: "u2".into(),
            body: "hello".into(),
        },
    );
    assert!(matches!(missing, Err(Error::NotFound(999))));
}

#[test]
fn tantivy_backed_service_round_trip() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let storage = SqliteStorage::open_in_memory().expect("open store");
    // One client, shared: the index writer lock lives inside it.
    let reader = std::sync::Arc::new(TantivyIndexClient::open(dir.path()));
    let mut service = ItemService::new(
        storage,
        IndexSynchronizer::new(Box::new(std::sync::Arc::clone(&reader))),
    );

    let created = service.create(new_item("Blue lamp", "u1")).unwrap();
    assert!(created.index.is_applied());
    let id = created.item.id.unwrap();

    let hits = reader.search("items", "lamp", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, id.to_string());

    service
        .update(
            id,
            ItemPatch {
                title: Some("Red umbrella".into()),
                ..ItemPatch::default()
            },
        )
        .unwrap();
    assert!(reader.search("items", "lamp", 10).unwrap().is_empty());
    assert_eq!(reader.search("items", "umbrella", 10).unwrap().len(), 1);

    let deleted = service.delete(id).unwrap();
    assert!(deleted.index.is_applied());
    assert!(reader.search("items", "umbrella", 10).unwrap().is_empty());
}
