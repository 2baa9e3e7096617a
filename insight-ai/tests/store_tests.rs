//! Integration tests for the SQLite record store

mod helpers;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use helpers::{completed_image, create_test_db, get_table_names, has_column, owner_record, profile_record};
use insight_ai::db::SqliteRecordStore;
use insight_ai::models::{PayloadRef, RecordKind, RecordStatus, RecordUpdate};
use insight_ai::services::record_status;
use insight_ai::store::{RecordFilter, RecordStore};
use serde_json::json;

/// Current time at the store's timestamp precision
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[tokio::test]
async fn test_schema_created() {
    let (_dir, pool) = create_test_db().await.unwrap();

    let tables = get_table_names(&pool).await.unwrap();
    assert!(tables.contains(&"analysis_records".to_string()));
    assert!(tables.contains(&"settings".to_string()));

    for column in ["id", "owner_id", "kind", "payload_ref", "status", "result", "error", "updated_at"] {
        assert!(has_column(&pool, "analysis_records", column).await.unwrap(), "missing {}", column);
    }
}

#[tokio::test]
async fn test_insert_and_find_preserves_fields() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = SqliteRecordStore::new(pool, 1000);

    let record = owner_record("report-1", "user-1", RecordKind::Report, now());
    let mut explicit = record.clone();
    explicit.id = "report-2".to_string();
    explicit.payload_ref = PayloadRef::Records {
        ids: vec!["img-1".to_string(), "img-2".to_string()],
    };
    store.insert(&record).await.unwrap();
    store.insert(&explicit).await.unwrap();

    assert_eq!(store.find_by_id("report-1").await.unwrap(), Some(record));
    assert_eq!(store.find_by_id("report-2").await.unwrap(), Some(explicit));
    assert_eq!(store.find_by_id("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_duplicate_insert_fails() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = SqliteRecordStore::new(pool, 1000);
    let record = owner_record("trait-1", "user-1", RecordKind::TraitEstimate, now());

    store.insert(&record).await.unwrap();
    assert!(store.insert(&record).await.is_err());
}

#[tokio::test]
async fn test_update_transitions_and_missing_record() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = SqliteRecordStore::new(pool, 1000);
    let now = now();
    store
        .insert(&owner_record("trait-1", "user-1", RecordKind::TraitEstimate, now))
        .await
        .unwrap();

    let later = now + Duration::seconds(5);
    assert!(store
        .update("trait-1", &RecordUpdate::failed("INFERENCE_UNAVAILABLE: down", later))
        .await
        .unwrap());
    let failed = store.find_by_id("trait-1").await.unwrap().unwrap();
    assert_eq!(failed.status, RecordStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("INFERENCE_UNAVAILABLE: down"));
    assert_eq!(failed.updated_at, later);

    let result = json!({ "outcome": "insight", "insight": { "summary": "ok" } });
    assert!(store
        .update("trait-1", &RecordUpdate::completed(result.clone(), later))
        .await
        .unwrap());
    let completed = store.find_by_id("trait-1").await.unwrap().unwrap();
    assert_eq!(completed.status, RecordStatus::Completed);
    assert_eq!(completed.result, Some(result));
    assert!(completed.error.is_none());

    assert!(!store
        .update("missing", &RecordUpdate::analyzing(later))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_find_all_by_status_oldest_first() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = SqliteRecordStore::new(pool, 1000);
    let now = now();

    for (id, minutes_ago) in [("b", 5), ("a", 50), ("c", 1)] {
        store
            .insert(&owner_record(id, "user-1", RecordKind::TraitEstimate, now - Duration::minutes(minutes_ago)))
            .await
            .unwrap();
    }
    store.update("c", &RecordUpdate::analyzing(now)).await.unwrap();
    store.insert(&profile_record("p", "user-1", now)).await.unwrap();

    let open = store
        .find_all_by_status(&[RecordStatus::Pending, RecordStatus::Analyzing])
        .await
        .unwrap();
    let ids: Vec<&str> = open.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    assert!(store.find_all_by_status(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_recent_by_owner_filters_orders_and_limits() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = SqliteRecordStore::new(pool, 1000);
    let now = now();

    for (id, minutes_ago) in [("img-old", 30), ("img-new", 1), ("img-mid", 10)] {
        store
            .insert(&completed_image(id, "user-1", "a scene", now - Duration::minutes(minutes_ago)))
            .await
            .unwrap();
    }
    store
        .insert(&completed_image("img-other", "user-2", "a scene", now))
        .await
        .unwrap();
    store.insert(&profile_record("profile-1", "user-1", now)).await.unwrap();
    store
        .insert(&owner_record("trait-1", "user-1", RecordKind::TraitEstimate, now))
        .await
        .unwrap();

    let images = store
        .find_recent_by_owner("user-1", &RecordFilter::completed(&[RecordKind::Image]), 2)
        .await
        .unwrap();
    let ids: Vec<&str> = images.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["img-new", "img-mid"]);

    let everything = store
        .find_recent_by_owner("user-1", &RecordFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(everything.len(), 5);

    let pending_only = store
        .find_recent_by_owner(
            "user-1",
            &RecordFilter {
                kinds: Vec::new(),
                statuses: vec![RecordStatus::Pending],
            },
            10,
        )
        .await
        .unwrap();
    assert_eq!(pending_only.len(), 1);
    assert_eq!(pending_only[0].id, "trait-1");
}

#[tokio::test]
async fn test_status_view_and_delete() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = SqliteRecordStore::new(pool, 1000);
    let now = now();
    store
        .insert(&completed_image("img-1", "user-1", "a lake", now))
        .await
        .unwrap();

    let view = record_status(&store, "img-1").await.unwrap().unwrap();
    assert_eq!(view.status, RecordStatus::Completed);
    assert!(!view.insufficient_data);
    assert_eq!(view.result.unwrap()["insight"]["description"], "a lake");

    assert!(store.delete("img-1").await.unwrap());
    assert!(!store.delete("img-1").await.unwrap());
    assert!(record_status(&store, "img-1").await.unwrap().is_none());
}
