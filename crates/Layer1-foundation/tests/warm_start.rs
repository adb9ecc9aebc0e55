//! Warm start through an on-disk database

use chrono::{Duration, Utc};
use recall_foundation::{
    CachedArtifact, HistoryEntry, PersistenceBackend, RecallConfig, RecallManager, Role,
    SqliteStore,
};
use serde_json::json;
use std::path::Path;

fn config(db: &Path) -> RecallConfig {
    RecallConfig::default()
        .with_persistence_path(db)
        .without_janitor()
}

#[tokio::test]
async fn test_cache_and_history_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state").join("recall.db");
    let base = Utc::now() - Duration::minutes(5);

    let first = RecallManager::open(config(&db)).await;
    assert!(first.persistence_enabled());

    let request = json!({"model": "grok-3", "prompt": "list files", "stream": true});
    let key = first
        .store(
            &request,
            CachedArtifact::tool_result("a.rs\nb.rs").with_metadata("tool", json!("glob")),
        )
        .unwrap();

    for (i, role) in [Role::User, Role::Assistant, Role::User].into_iter().enumerate() {
        first.history().append(
            HistoryEntry::new(role, format!("turn {}", i))
                .with_id(format!("turn-{}", i))
                .with_timestamp(base + Duration::seconds(i as i64)),
        );
    }

    let stats = first.shutdown().await;
    let persistence = stats.persistence.expect("worker stats");
    assert_eq!(persistence.completed, 4);
    assert_eq!(persistence.dropped, 0);

    let second = RecallManager::open(config(&db)).await;
    let replay = json!({"prompt": "list files", "model": "grok-3", "stream": false});
    let hit = second.lookup(&replay).expect("restored artifact");
    assert_eq!(hit.key, key.as_str());
    assert_eq!(hit.content, "a.rs\nb.rs");
    assert_eq!(hit.metadata.get("tool"), Some(&json!("glob")));

    let recent = second.history().recent(10);
    let ids: Vec<&str> = recent.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["turn-0", "turn-1", "turn-2"]);
    assert_eq!(recent[1].role, Role::Assistant);

    second.shutdown().await;
}

#[tokio::test]
async fn test_expired_rows_are_not_restored() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("recall.db");

    {
        let store = SqliteStore::open(&db).unwrap();
        let mut stale = CachedArtifact::text("old answer")
            .with_created_at(Utc::now() - Duration::hours(3));
        stale.key = "stale".to_string();
        let mut fresh = CachedArtifact::text("new answer");
        fresh.key = "fresh".to_string();

        store.save_artifact(&stale).unwrap();
        store.save_artifact(&fresh).unwrap();
    }

    let recall = RecallManager::open(config(&db)).await;
    assert!(recall.cache().contains("fresh"));
    assert!(!recall.cache().contains("stale"));
    assert_eq!(recall.cache().len(), 1);

    recall.shutdown().await;
}

#[tokio::test]
async fn test_clear_is_mirrored() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("recall.db");

    let first = RecallManager::open(config(&db)).await;
    first.store(&json!({"q": 1}), CachedArtifact::text("one")).unwrap();
    first.record_turn(Role::User, "hello");
    first.cache().clear();
    first.history().clear();
    first.shutdown().await;

    let store = SqliteStore::open(&db).unwrap();
    assert_eq!(store.artifact_count().unwrap(), 0);
    assert_eq!(store.history_count().unwrap(), 0);
}
