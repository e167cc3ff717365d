//! Workflow tests for the query history store.
//!
//! Covers user creation, append deduplication, listing, detail lookups and
//! instance deletion against the in-memory backend.

use super::memory_store;
use query_history::history::{HistoryError, QueryListing, UserRecord};
use serde_json::json;

#[tokio::test]
async fn test_first_append_creates_single_entry() {
    let store = memory_store();
    store.find_or_create_user("alice").await.unwrap();

    store
        .append_instance("alice", "SELECT 1", json!("metricsX"))
        .await
        .unwrap();

    let record = store.find_or_create_user("alice").await.unwrap();
    assert_eq!(record.query_history.len(), 1);
    let entry = &record.query_history[0];
    assert_eq!(entry.query_string, "SELECT 1");
    assert_eq!(entry.counter(), 1);
    assert_eq!(entry.output_metrics(), vec![&json!("metricsX")]);
}

#[tokio::test]
async fn test_repeat_append_lists_once_with_latest_timestamp() {
    let store = memory_store();
    store.find_or_create_user("alice").await.unwrap();
    store
        .append_instance("alice", "SELECT 1", json!("first"))
        .await
        .unwrap();
    let second = store
        .append_instance("alice", "SELECT 1", json!("second"))
        .await
        .unwrap();

    let listing = store.list_queries("alice").await.unwrap();
    let summaries = listing.summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].counter, 2);

    let latest = store
        .instance_detail("alice", &second.entry_id, &second.instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summaries[0].timestamp.as_deref(), Some(latest.timestamp.as_str()));
}

#[tokio::test]
async fn test_find_or_create_twice_creates_one_record() {
    let store = memory_store();
    store.find_or_create_user("newcomer").await.unwrap();
    store.find_or_create_user("newcomer").await.unwrap();
    assert_eq!(store.persistence().user_count(), 1);
}

#[tokio::test]
async fn test_distinct_queries_keep_first_seen_order() {
    let store = memory_store();
    store.find_or_create_user("alice").await.unwrap();
    for query in ["SELECT b", "SELECT a", "SELECT b", "SELECT c"] {
        store
            .append_instance("alice", query, json!("m"))
            .await
            .unwrap();
    }

    let listing = store.list_queries("alice").await.unwrap();
    let order: Vec<&str> = listing
        .summaries()
        .iter()
        .map(|s| s.query_string.as_str())
        .collect();
    assert_eq!(order, vec!["SELECT b", "SELECT a", "SELECT c"]);
    assert_eq!(listing.summaries()[0].counter, 2);
}

#[tokio::test]
async fn test_delete_unknown_instance_leaves_record_unchanged() {
    let store = memory_store();
    store.find_or_create_user("alice").await.unwrap();
    let mut entry_id = String::new();
    for n in 0..3 {
        entry_id = store
            .append_instance("alice", "SELECT 1", json!(n))
            .await
            .unwrap()
            .entry_id;
    }
    let before = store.find_or_create_user("alice").await.unwrap();

    let removed = store
        .delete_instance("alice", &entry_id, "not-an-instance")
        .await
        .unwrap();

    assert!(!removed);
    assert_eq!(store.find_or_create_user("alice").await.unwrap(), before);
}

#[tokio::test]
async fn test_instance_detail_for_unknown_entry_is_empty() {
    let store = memory_store();
    store.find_or_create_user("alice").await.unwrap();
    store
        .append_instance("alice", "SELECT 1", json!("m"))
        .await
        .unwrap();

    let detail = store
        .instance_detail("alice", "no-such-entry", "no-such-instance")
        .await
        .unwrap();
    assert!(detail.is_none());
}

#[tokio::test]
async fn test_delete_middle_of_three_keeps_relative_order() {
    let store = memory_store();
    store.find_or_create_user("alice").await.unwrap();
    let mut runs = Vec::new();
    for metrics in ["a", "b", "c"] {
        runs.push(
            store
                .append_instance("alice", "SELECT 1", json!(metrics))
                .await
                .unwrap(),
        );
    }

    store
        .delete_instance("alice", &runs[1].entry_id, &runs[1].instance_id)
        .await
        .unwrap();

    let entry = store
        .query_detail("alice", &runs[0].entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        entry.instance_ids(),
        vec![runs[0].instance_id.as_str(), runs[2].instance_id.as_str()]
    );
    assert_eq!(entry.output_metrics(), vec![&json!("a"), &json!("c")]);
    assert_eq!(entry.timestamps().len(), entry.counter());
}

#[tokio::test]
async fn test_deleting_every_instance_drops_entry() {
    let store = memory_store();
    store.find_or_create_user("alice").await.unwrap();
    let only = store
        .append_instance("alice", "SELECT 1", json!("m"))
        .await
        .unwrap();

    store
        .delete_instance("alice", &only.entry_id, &only.instance_id)
        .await
        .unwrap();

    assert_eq!(
        store.list_queries("alice").await.unwrap(),
        QueryListing::Queries(Vec::new())
    );
    assert!(store
        .query_detail("alice", &only.entry_id)
        .await
        .unwrap()
        .is_none());

    // The query string can be recorded again under a fresh entry.
    let again = store
        .append_instance("alice", "SELECT 1", json!("m"))
        .await
        .unwrap();
    assert!(again.created_entry);
    assert_ne!(again.entry_id, only.entry_id);
}

#[tokio::test]
async fn test_corrupted_duplicate_entries_surface_error() {
    let store = memory_store();
    let mut record = UserRecord::new("alice");
    record
        .append_instance(
            "SELECT 1",
            query_history::history::Instance::new(json!("m"), "then".to_string()),
        )
        .unwrap();
    let mut duplicate = record.query_history[0].clone();
    duplicate.id = "legacy-duplicate".to_string();
    record.query_history.push(duplicate);
    store.persistence().insert_user(record.clone());

    let err = store
        .append_instance("alice", "SELECT 1", json!("new"))
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::IntegrityViolation(_)));
    assert_eq!(store.find_or_create_user("alice").await.unwrap(), record);
}
