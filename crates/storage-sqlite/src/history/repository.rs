//! Repository for sync run history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, max, sql};
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sql_types::{BigInt, Double, Nullable};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use timesync_core::errors::Result;
use timesync_core::sync::{SyncHistoryRepositoryTrait, SyncHistoryStats, SyncRunRecord};

use super::model::SyncRunDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_runs;

pub struct SyncHistoryRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncHistoryRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[async_trait]
impl SyncHistoryRepositoryTrait for SyncHistoryRepository {
    async fn record(&self, run: SyncRunRecord) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let db_model: SyncRunDB = run.into();
                diesel::insert_into(sync_runs::table)
                    .values(&db_model)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn list_recent(&self, limit: i64) -> Result<Vec<SyncRunRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_runs::table
            .order(sync_runs::started_at.desc())
            .limit(limit)
            .select(SyncRunDB::as_select())
            .load::<SyncRunDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn stats(&self) -> Result<SyncHistoryStats> {
        let mut conn = get_connection(&self.pool)?;
        let (total_runs, successful_runs, total_created, total_updated, total_deleted, average, last_run) =
            sync_runs::table
                .select((
                    count_star(),
                    sql::<BigInt>("COALESCE(SUM(success), 0)"),
                    sql::<BigInt>("COALESCE(SUM(created), 0)"),
                    sql::<BigInt>("COALESCE(SUM(updated), 0)"),
                    sql::<BigInt>("COALESCE(SUM(deleted), 0)"),
                    sql::<Nullable<Double>>("AVG(duration_ms)"),
                    max(sync_runs::started_at),
                ))
                .first::<(i64, i64, i64, i64, i64, Option<f64>, Option<String>)>(&mut conn)
                .map_err(StorageError::from)?;

        let last_success = sync_runs::table
            .filter(sync_runs::success.eq(true))
            .select(max(sync_runs::started_at))
            .first::<Option<String>>(&mut conn)
            .map_err(StorageError::from)?;

        Ok(SyncHistoryStats {
            total_runs,
            successful_runs,
            failed_runs: total_runs - successful_runs,
            total_created,
            total_updated,
            total_deleted,
            average_duration_ms: average,
            last_run_at: parse_timestamp(last_run),
            last_success_at: parse_timestamp(last_success),
        })
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff.to_rfc3339();
        self.writer
            .exec(move |conn| {
                Ok(diesel::delete(sync_runs::table.filter(sync_runs::started_at.lt(cutoff)))
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use chrono::{Duration, NaiveDate};
    use tempfile::{tempdir, TempDir};

    fn setup() -> (SyncHistoryRepository, TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("timesync.db");
        let pool = create_pool(db_path.to_str().unwrap()).unwrap();
        run_migrations(&pool).unwrap();
        let writer = spawn_writer((*pool).clone());
        (SyncHistoryRepository::new(Arc::clone(&pool), writer), temp_dir)
    }

    fn run(id: &str, started_at: DateTime<Utc>, success: bool, created: i32) -> SyncRunRecord {
        SyncRunRecord {
            id: id.to_string(),
            started_at,
            finished_at: started_at + Duration::milliseconds(1500),
            window_start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            window_end: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            success,
            dry_run: false,
            source_count: 10,
            created,
            updated: 1,
            deleted: 0,
            recovered: 0,
            failed: if success { 0 } else { 2 },
            error: (!success).then(|| "all 2 attempted actions failed".to_string()),
            duration_ms: 1500,
        }
    }

    #[tokio::test]
    async fn test_record_and_list_recent() {
        let (repo, _dir) = setup();
        let now = Utc::now();
        repo.record(run("a", now - Duration::hours(2), true, 3))
            .await
            .unwrap();
        repo.record(run("b", now - Duration::hours(1), false, 0))
            .await
            .unwrap();

        let recent = repo.list_recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "b");
        assert!(!recent[0].success);
        assert_eq!(recent[1].window_end, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());

        assert_eq!(repo.list_recent(1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stats_aggregate_runs() {
        let (repo, _dir) = setup();
        let empty = repo.stats().unwrap();
        assert_eq!(empty.total_runs, 0);
        assert_eq!(empty.success_rate(), None);

        let now = Utc::now();
        repo.record(run("a", now - Duration::hours(3), true, 3))
            .await
            .unwrap();
        repo.record(run("b", now - Duration::hours(2), true, 2))
            .await
            .unwrap();
        repo.record(run("c", now - Duration::hours(1), false, 0))
            .await
            .unwrap();

        let stats = repo.stats().unwrap();
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.successful_runs, 2);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.total_created, 5);
        assert_eq!(stats.total_updated, 3);
        assert_eq!(stats.average_duration_ms, Some(1500.0));
        assert!(stats.last_success_at.unwrap() < stats.last_run_at.unwrap());
    }

    #[tokio::test]
    async fn test_stats_track_latest_success_separately() {
        let (repo, _dir) = setup();
        let empty = repo.stats().unwrap();
        assert_eq!(empty.average_duration_ms, None);
        assert_eq!(empty.last_run_at, None);
        assert_eq!(empty.last_success_at, None);

        let now = Utc::now();
        let latest_success = now - Duration::hours(2);
        repo.record(run("a", now - Duration::hours(4), true, 1))
            .await
            .unwrap();
        repo.record(run("b", latest_success, true, 1))
            .await
            .unwrap();
        repo.record(run("c", now - Duration::hours(1), false, 0))
            .await
            .unwrap();

        let stats = repo.stats().unwrap();
        assert_eq!(stats.total_deleted, 0);
        assert_eq!(stats.last_success_at, Some(latest_success));
        assert_eq!(stats.last_run_at, Some(now - Duration::hours(1)));
        assert_eq!(stats.success_rate(), Some(2.0 / 3.0));
    }

    #[tokio::test]
    async fn test_prune_removes_old_runs() {
        let (repo, _dir) = setup();
        let now = Utc::now();
        repo.record(run("old", now - Duration::days(120), true, 1))
            .await
            .unwrap();
        repo.record(run("new", now - Duration::days(1), true, 1))
            .await
            .unwrap();

        let removed = repo
            .prune_older_than(now - Duration::days(90))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        let remaining = repo.list_recent(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "new");
    }
}
