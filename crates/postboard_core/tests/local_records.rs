use postboard_core::backend::{BackendError, RecordBackend, SelectQuery};
use postboard_core::db::LocalRecordBackend;
use serde_json::{json, Value};

const TABLE: &str = "articles";

fn backend() -> LocalRecordBackend {
    LocalRecordBackend::open_in_memory().unwrap()
}

fn ids(rows: &[Value]) -> Vec<&str> {
    rows.iter().map(|row| row["id"].as_str().unwrap()).collect()
}

#[tokio::test]
async fn insert_assigns_id_and_timestamps() {
    let records = backend();

    let row = records
        .insert(TABLE, json!({ "content": "hello", "image_url": null }))
        .await
        .unwrap();

    let id = row["id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
    assert!(row["created_at"].as_str().unwrap().ends_with('Z'));
    assert_eq!(row["created_at"], row["updated_at"]);
    assert_eq!(row["content"], "hello");
}

#[tokio::test]
async fn select_orders_descending_with_newest_insert_winning_ties() {
    let records = backend();
    for (id, created_at) in [
        ("a", "2024-01-01T00:00:00.000000Z"),
        ("b", "2024-01-03T00:00:00.000000Z"),
        ("c", "2024-01-02T00:00:00.000000Z"),
        ("d", "2024-01-03T00:00:00.000000Z"),
    ] {
        records
            .insert(TABLE, json!({ "id": id, "created_at": created_at }))
            .await
            .unwrap();
    }

    let rows = records
        .select(TABLE, &SelectQuery::new().order_by("created_at", false))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["d", "b", "c", "a"]);

    let rows = records
        .select(TABLE, &SelectQuery::new().order_by("created_at", true).limit(2))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["a", "c"]);
}

#[tokio::test]
async fn select_applies_equality_filters_per_table() {
    let records = backend();
    records
        .insert(TABLE, json!({ "id": "1", "user_id": "alice" }))
        .await
        .unwrap();
    records
        .insert(TABLE, json!({ "id": "2", "user_id": "bob" }))
        .await
        .unwrap();
    records
        .insert("comments", json!({ "id": "3", "user_id": "alice" }))
        .await
        .unwrap();

    let rows = records
        .select(TABLE, &SelectQuery::new().eq("user_id", "alice"))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["1"]);

    let all = records.select(TABLE, &SelectQuery::new()).await.unwrap();
    assert_eq!(ids(&all), vec!["1", "2"]);
}

#[tokio::test]
async fn select_rejects_non_identifier_columns() {
    let records = backend();
    let err = records
        .select(TABLE, &SelectQuery::new().order_by("created_at; --", false))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Rejected { status: 400, .. }));
}

#[tokio::test]
async fn update_merges_patch_and_restamps_updated_at() {
    let records = backend();
    records
        .insert(
            TABLE,
            json!({
                "id": "a1",
                "user_id": "alice",
                "content": "before",
                "created_at": "2000-01-01T00:00:00.000000Z",
                "updated_at": "2000-01-01T00:00:00.000000Z"
            }),
        )
        .await
        .unwrap();

    let updated = records
        .update(TABLE, "a1", json!({ "content": "after", "id": "hijack" }))
        .await
        .unwrap()
        .expect("row should exist");

    assert_eq!(updated["id"], "a1");
    assert_eq!(updated["user_id"], "alice");
    assert_eq!(updated["content"], "after");
    assert_eq!(updated["created_at"], "2000-01-01T00:00:00.000000Z");
    assert_ne!(updated["updated_at"], "2000-01-01T00:00:00.000000Z");

    let stored = records.select(TABLE, &SelectQuery::new().eq("id", "a1")).await.unwrap();
    assert_eq!(stored, vec![updated]);
}

#[tokio::test]
async fn update_of_missing_row_returns_none() {
    let records = backend();
    let result = records
        .update(TABLE, "missing", json!({ "content": "x" }))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn duplicate_id_is_rejected_as_conflict() {
    let records = backend();
    records.insert(TABLE, json!({ "id": "a1" })).await.unwrap();
    let err = records.insert(TABLE, json!({ "id": "a1" })).await.unwrap_err();
    assert!(matches!(err, BackendError::Rejected { status: 409, .. }));
}

#[tokio::test]
async fn delete_removes_row_and_tolerates_missing_rows() {
    let records = backend();
    records.insert(TABLE, json!({ "id": "a1" })).await.unwrap();

    records.delete(TABLE, "a1").await.unwrap();
    records.delete(TABLE, "a1").await.unwrap();

    let rows = records.select(TABLE, &SelectQuery::new()).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn rows_survive_reopening_the_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");

    let first = LocalRecordBackend::open(&path).unwrap();
    first.insert(TABLE, json!({ "id": "a1", "content": "kept" })).await.unwrap();
    drop(first);

    let second = LocalRecordBackend::open(&path).unwrap();
    let rows = second.select(TABLE, &SelectQuery::new()).await.unwrap();
    assert_eq!(rows[0]["content"], "kept");
}
