use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use diesel::prelude::*;
use tempfile::{tempdir, TempDir};

use timesync_core::mappings::{Fingerprint, IdentityStoreTrait, MappingUpsert};

use super::IdentityMappingRepository;
use crate::db::{create_pool, get_connection, run_migrations, spawn_writer, DbPool};
use crate::schema::identity_mappings;

fn setup() -> (IdentityMappingRepository, Arc<DbPool>, TempDir) {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("timesync.db");
    let pool = create_pool(db_path.to_str().unwrap()).unwrap();
    run_migrations(&pool).unwrap();
    let writer = spawn_writer((*pool).clone());
    let repo = IdentityMappingRepository::new(Arc::clone(&pool), writer);
    (repo, pool, temp_dir)
}

fn fingerprint(duration: i64) -> Fingerprint {
    Fingerprint {
        duration_seconds: duration,
        description: "AS: No description [correlation:610]".to_string(),
        work_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
    }
}

fn synced(id: &str, destination: &str) -> MappingUpsert {
    MappingUpsert::synced(id, destination, "AS", fingerprint(1800), None)
}

#[tokio::test]
async fn test_put_and_get_round_trip() {
    let (repo, _pool, _dir) = setup();

    repo.put(synced("610", "d1")).await.unwrap();
    let mapping = repo.get("610").unwrap().unwrap();

    assert_eq!(mapping.destination_id.as_deref(), Some("d1"));
    assert_eq!(mapping.container_key, "AS");
    assert_eq!(mapping.fingerprint(), Some(fingerprint(1800)));
    assert!(!mapping.needs_update);
    assert!(!mapping.processed);
    assert!(mapping.last_verified_at.is_some());
    assert_eq!(repo.get_destination_id("610").unwrap().as_deref(), Some("d1"));
    assert!(repo.get("611").unwrap().is_none());
}

#[tokio::test]
async fn test_put_preserves_processed_and_created_at() {
    let (repo, _pool, _dir) = setup();
    let first = repo
        .put(MappingUpsert::pending("610", "AS", fingerprint(1800), None))
        .await
        .unwrap();
    repo.mark_processed("610").await.unwrap();

    let second = repo.put(synced("610", "d1")).await.unwrap();

    assert!(second.processed);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.destination_id.as_deref(), Some("d1"));
    assert!(!second.needs_update);
}

#[tokio::test]
async fn test_put_clears_destination_id() {
    let (repo, _pool, _dir) = setup();
    repo.put(synced("610", "d1")).await.unwrap();

    repo.put(MappingUpsert::pending("610", "AS", fingerprint(1800), None))
        .await
        .unwrap();

    let mapping = repo.get("610").unwrap().unwrap();
    assert_eq!(mapping.destination_id, None);
    assert!(mapping.needs_update);
}

#[tokio::test]
async fn test_has_changed_compares_fingerprint() {
    let (repo, _pool, _dir) = setup();
    assert!(repo.has_changed("610", &fingerprint(1800)).unwrap());

    repo.put(synced("610", "d1")).await.unwrap();

    assert!(!repo.has_changed("610", &fingerprint(1800)).unwrap());
    assert!(repo.has_changed("610", &fingerprint(3600)).unwrap());
}

#[tokio::test]
async fn test_recovered_mapping_reports_change() {
    let (repo, _pool, _dir) = setup();
    repo.put(MappingUpsert::recovered("610", "d1", "AS")).await.unwrap();

    let mapping = repo.get("610").unwrap().unwrap();
    assert!(mapping.recovered);
    assert!(repo.has_changed("610", &fingerprint(1800)).unwrap());
}

#[tokio::test]
async fn test_stage_update_sets_flag_and_fingerprint() {
    let (repo, _pool, _dir) = setup();
    repo.put(synced("610", "d1")).await.unwrap();

    repo.stage_update("610", fingerprint(3600), Some("2025-01-16T08:00:00Z".to_string()))
        .await
        .unwrap();

    let mapping = repo.get("610").unwrap().unwrap();
    assert!(mapping.needs_update);
    assert_eq!(mapping.last_duration_seconds, Some(3600));
    assert_eq!(mapping.source_updated_at.as_deref(), Some("2025-01-16T08:00:00Z"));
    assert!(!repo.has_changed("610", &fingerprint(3600)).unwrap());

    repo.clear_update_flag("610").await.unwrap();
    assert!(!repo.get("610").unwrap().unwrap().needs_update);
    repo.mark_for_update("610").await.unwrap();
    assert!(repo.get("610").unwrap().unwrap().needs_update);
}

#[tokio::test]
async fn test_processed_flags_drive_unprocessed_scan() {
    let (repo, _pool, _dir) = setup();
    for id in ["610", "611", "612"] {
        repo.put(synced(id, &format!("d{}", id))).await.unwrap();
    }
    repo.mark_processed("610").await.unwrap();
    repo.mark_processed("612").await.unwrap();

    let pending: Vec<String> = repo
        .unprocessed()
        .unwrap()
        .into_iter()
        .map(|m| m.source_id)
        .collect();
    assert_eq!(pending, vec!["611".to_string()]);

    assert_eq!(repo.reset_processed().await.unwrap(), 3);
    assert_eq!(repo.unprocessed().unwrap().len(), 3);
}

#[tokio::test]
async fn test_remove_and_count() {
    let (repo, _pool, _dir) = setup();
    repo.put(synced("610", "d1")).await.unwrap();
    repo.put(synced("611", "d2")).await.unwrap();
    assert_eq!(repo.count().unwrap(), 2);

    assert!(repo.remove("610").await.unwrap());
    assert!(!repo.remove("610").await.unwrap());
    assert_eq!(repo.count().unwrap(), 1);
    assert_eq!(repo.list().unwrap()[0].source_id, "611");
}

#[tokio::test]
async fn test_existence_check_follows_verification_age() {
    let (repo, pool, _dir) = setup();
    repo.put(synced("610", "d1")).await.unwrap();
    assert!(!repo.needs_existence_check("610", 24).unwrap());

    let stale = (Utc::now() - Duration::hours(30)).to_rfc3339();
    let mut conn = get_connection(&pool).unwrap();
    diesel::update(identity_mappings::table.find("610"))
        .set(identity_mappings::last_verified_at.eq(Some(stale)))
        .execute(&mut conn)
        .unwrap();
    assert!(repo.needs_existence_check("610", 24).unwrap());

    repo.mark_verified("610").await.unwrap();
    assert!(!repo.needs_existence_check("610", 24).unwrap());
}

#[tokio::test]
async fn test_corrupt_row_reads_as_absent_and_is_overwritten() {
    let (repo, pool, _dir) = setup();
    repo.put(synced("610", "d1")).await.unwrap();
    repo.put(synced("611", "d2")).await.unwrap();

    let mut conn = get_connection(&pool).unwrap();
    diesel::update(identity_mappings::table.find("610"))
        .set((
            identity_mappings::last_work_date.eq(Some("not a date")),
            identity_mappings::created_at.eq("garbage"),
        ))
        .execute(&mut conn)
        .unwrap();

    assert!(repo.get("610").unwrap().is_none());
    assert_eq!(repo.list().unwrap().len(), 1);
    assert_eq!(repo.count().unwrap(), 2);

    let rewritten = repo
        .put(MappingUpsert::pending("610", "AS", fingerprint(1800), None))
        .await
        .unwrap();
    assert_eq!(rewritten.destination_id, None);
    assert!(repo.get("610").unwrap().is_some());
}
