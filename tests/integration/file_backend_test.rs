//! End-to-end tests against the JSON file backend.

use super::store_with;
use query_history::commands::HistoryCommands;
use query_history::config::HistoryConfig;
use query_history::history::{FilePersistence, Persistence};
use serde_json::json;
use tempfile::TempDir;

fn file_store(dir: &TempDir) -> FilePersistence {
    let config = HistoryConfig {
        data_dir: dir.path().join("history").to_string_lossy().into_owned(),
        ..Default::default()
    };
    FilePersistence::from_config(&config).expect("Failed to open data directory")
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let run = {
        let store = store_with(file_store(&dir));
        store.find_or_create_user("alice@example.com").await.unwrap();
        store
            .append_instance("alice@example.com", "SELECT 1", json!({"rows": 1}))
            .await
            .unwrap()
    };

    let reopened = store_with(file_store(&dir));
    let entry = reopened
        .query_detail("alice@example.com", &run.entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.query_string, "SELECT 1");
    assert_eq!(entry.instance_ids(), vec![run.instance_id.as_str()]);
}

#[tokio::test]
async fn test_delete_instance_is_persisted() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_with(file_store(&dir));
    store.find_or_create_user("bob").await.unwrap();

    let first = store
        .append_instance("bob", "SELECT 1", json!("a"))
        .await
        .unwrap();
    let second = store
        .append_instance("bob", "SELECT 1", json!("b"))
        .await
        .unwrap();
    store
        .delete_instance("bob", &first.entry_id, &first.instance_id)
        .await
        .unwrap();

    let stored = file_store(&dir).find_user("bob").unwrap().unwrap();
    let entry = &stored.query_history[0];
    assert_eq!(entry.instance_ids(), vec![second.instance_id.as_str()]);
    assert_eq!(entry.output_metrics(), vec![&json!("b")]);
}

#[tokio::test]
async fn test_commands_over_file_backend() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let commands = HistoryCommands::new(store_with(file_store(&dir)));

    let record = commands
        .add_metrics(Some("carol"), Some("SELECT 2"), Some(json!("rows=2")))
        .await
        .unwrap();
    assert_eq!(commands.store().persistence().load_metrics().unwrap().len(), 1);

    commands.delete_log(Some(record.id.as_str())).await.unwrap();
    assert!(commands
        .store()
        .persistence()
        .load_metrics()
        .unwrap()
        .is_empty());

    let err = commands
        .delete_log(Some(record.id.as_str()))
        .await
        .unwrap_err();
    assert_eq!(err.message, "Error with query deletion");
}

#[tokio::test]
async fn test_long_non_ascii_username() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_with(file_store(&dir));
    let username = "é".repeat(60);

    store.find_or_create_user(&username).await.unwrap();
    let outcome = store
        .append_instance(&username, "SELECT 1", json!("m"))
        .await
        .unwrap();

    let entry = store_with(file_store(&dir))
        .query_detail(&username, &outcome.entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.instance_ids(), vec![outcome.instance_id.as_str()]);
}
