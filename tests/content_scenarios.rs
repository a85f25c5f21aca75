//! End-to-end runs of the built-in migrations: legacy scale rewriting,
//! published-range derivation with joins, unknown-field preservation and
//! referential-inconsistency skipping.

mod support;

use std::sync::Arc;

use serde_json::{json, Value};

use couchdb_migrator::events::DomainEvent;
use couchdb_migrator::migrations::builtin_registry;
use couchdb_migrator::runner::MigrationRunner;
use couchdb_migrator::MigratorConfig;

use support::{MemoryStore, RecordingPublisher};

fn test_config() -> MigratorConfig {
    MigratorConfig {
        page_size: 2,
        index_poll_base: std::time::Duration::from_millis(1),
        ..MigratorConfig::default()
    }
}

fn runner(store: Arc<MemoryStore>, events: Arc<RecordingPublisher>) -> MigrationRunner {
    MigrationRunner::builder()
        .store(store)
        .registry(builtin_registry())
        .events(events)
        .config(test_config())
        .build()
        .unwrap()
}

#[tokio::test]
async fn legacy_scale_contents_are_rewritten() {
    let store = MemoryStore::new();
    store.insert(json!({
        "_id": "content-agree",
        "type": "Content",
        "format": "scale",
        "options": [
            {"label": "Strongly agree"},
            {"label": "Agree"},
            {"label": "Neutral"},
            {"label": "Disagree"},
            {"label": "Strongly disagree"}
        ],
        "roomId": "room-1",
        "body": "The pace was right.",
        "extensions": {"timer": 30}
    }));
    store.insert(json!({
        "_id": "content-four",
        "type": "Content",
        "format": "scale",
        "options": [
            {"label": "Strongly agree"},
            {"label": "Agree"},
            {"label": "Disagree"},
            {"label": "Strongly disagree"}
        ],
        "roomId": "room-1"
    }));
    store.insert(json!({
        "_id": "content-grades",
        "type": "Content",
        "format": "scale",
        "options": [
            {"label": "Excellent"},
            {"label": "Good"},
            {"label": "Fair"},
            {"label": "Poor"},
            {"label": "Very poor"}
        ],
        "roomId": "room-1"
    }));

    let events = RecordingPublisher::new();
    let run = runner(store.clone(), events);
    run.initialize().await.unwrap();
    run.migrate_up().await.unwrap();

    let agree = store.doc("content-agree").unwrap();
    assert_eq!(agree["format"], json!("SCALE"));
    assert_eq!(agree["optionCount"], json!(5));
    assert_eq!(agree["optionTemplate"], json!("AGREEMENT"));
    assert_eq!(agree["options"], Value::Null);
    // fields the step never declared travel through untouched
    assert_eq!(agree["body"], json!("The pace was right."));
    assert_eq!(agree["extensions"], json!({"timer": 30}));

    assert_eq!(store.doc("content-four").unwrap()["format"], json!("CHOICE"));
    let grades = store.doc("content-grades").unwrap();
    assert_eq!(grades["format"], json!("CHOICE"));
    assert_eq!(grades["options"].as_array().map(|o| o.len()), Some(5));

    // both built-in migrations finished
    let state = store.doc("migration-state").unwrap();
    assert_eq!(state["completed"], json!(["20201129120000", "20210908120000"]));
}

#[tokio::test]
async fn unknown_fields_keep_their_values_and_order() {
    let store = MemoryStore::new();
    store.insert(json!({
        "_id": "content-x",
        "type": "Content",
        "format": "scale",
        "options": [{"label": "Agree"}, {"label": "Disagree"}],
        "b": {"nested": [1, 2]},
        "c": "tail"
    }));

    let events = RecordingPublisher::new();
    runner(store.clone(), events).migrate_up().await.unwrap();

    let doc = store.doc("content-x").unwrap();
    assert_eq!(doc["b"], json!({"nested": [1, 2]}));
    assert_eq!(doc["c"], json!("tail"));
    let keys: Vec<&str> = doc.as_object().unwrap().keys().map(|k| k.as_str()).collect();
    let b_pos = keys.iter().position(|k| *k == "b").unwrap();
    let c_pos = keys.iter().position(|k| *k == "c").unwrap();
    assert!(b_pos < c_pos, "unknown fields must keep their relative order: {keys:?}");
}

#[tokio::test]
async fn group_ranges_are_derived_from_member_visibility() {
    let store = MemoryStore::new();
    for (i, visible) in [true, true, false, true].iter().enumerate() {
        store.insert(json!({
            "_id": format!("content-{i}"),
            "type": "Content",
            "format": "TEXT",
            "visible": visible
        }));
    }
    store.insert(json!({
        "_id": "group-mixed",
        "type": "ContentGroup",
        "roomId": "room-7",
        "contentIds": ["content-0", "content-1", "content-2", "content-3"]
    }));
    store.insert(json!({
        "_id": "group-dangling",
        "type": "ContentGroup",
        "roomId": "room-8",
        "contentIds": ["content-gone"]
    }));

    let events = RecordingPublisher::new();
    runner(store.clone(), events.clone()).migrate_up().await.unwrap();

    let group = store.doc("group-mixed").unwrap();
    assert_eq!(group["published"], json!(true));
    assert_eq!(group["firstPublishedIndex"], json!(0));
    // the published item after the gap is intentionally excluded
    assert_eq!(group["lastPublishedIndex"], json!(1));
    assert_eq!(
        events.events(),
        vec![DomainEvent::RoomHistoryMigrated {
            room_id: "room-7".to_string()
        }]
    );

    // the group referencing a missing content is skipped, not fatal
    let dangling = store.doc("group-dangling").unwrap();
    assert!(dangling.get("firstPublishedIndex").is_none());
    let state = store.doc("migration-state").unwrap();
    assert_eq!(state["completed"], json!(["20201129120000", "20210908120000"]));
}
