//! Database model for sync runs.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use timesync_core::sync::SyncRunRecord;

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncRunDB {
    pub id: String,
    pub started_at: String,
    pub finished_at: String,
    pub window_start: String,
    pub window_end: String,
    pub success: bool,
    pub dry_run: bool,
    pub source_count: i32,
    pub created: i32,
    pub updated: i32,
    pub deleted: i32,
    pub recovered: i32,
    pub failed: i32,
    pub error: Option<String>,
    pub duration_ms: i64,
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap_or_default()
}

impl From<SyncRunDB> for SyncRunRecord {
    fn from(db: SyncRunDB) -> Self {
        Self {
            id: db.id,
            started_at: parse_timestamp(&db.started_at),
            finished_at: parse_timestamp(&db.finished_at),
            window_start: parse_date(&db.window_start),
            window_end: parse_date(&db.window_end),
            success: db.success,
            dry_run: db.dry_run,
            source_count: db.source_count,
            created: db.created,
            updated: db.updated,
            deleted: db.deleted,
            recovered: db.recovered,
            failed: db.failed,
            error: db.error,
            duration_ms: db.duration_ms,
        }
    }
}

impl From<SyncRunRecord> for SyncRunDB {
    fn from(record: SyncRunRecord) -> Self {
        Self {
            id: record.id,
            started_at: record.started_at.to_rfc3339(),
            finished_at: record.finished_at.to_rfc3339(),
            window_start: record.window_start.format("%Y-%m-%d").to_string(),
            window_end: record.window_end.format("%Y-%m-%d").to_string(),
            success: record.success,
            dry_run: record.dry_run,
            source_count: record.source_count,
            created: record.created,
            updated: record.updated,
            deleted: record.deleted,
            recovered: record.recovered,
            failed: record.failed,
            error: record.error,
            duration_ms: record.duration_ms,
        }
    }
}
