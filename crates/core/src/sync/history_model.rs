use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::result_model::SyncRunResult;

/// One row of run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
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

impl SyncRunRecord {
    pub fn from_result(result: &SyncRunResult) -> Self {
        let error = if result.is_success() {
            None
        } else {
            Some(format!("all {} attempted actions failed", result.attempted()))
        };
        Self {
            id: result.run_id.clone(),
            started_at: result.started_at,
            finished_at: result.finished_at,
            window_start: result.window.start,
            window_end: result.window.end,
            success: result.is_success(),
            dry_run: result.dry_run,
            source_count: count(result.source_count),
            created: count(result.created),
            updated: count(result.updated),
            deleted: count(result.deleted),
            recovered: count(result.recovered),
            failed: count(result.failed),
            error,
            duration_ms: result.duration_ms(),
        }
    }

    /// A run that aborted before producing a result.
    pub fn aborted(partial: &SyncRunResult, error: impl ToString) -> Self {
        let mut record = Self::from_result(partial);
        record.success = false;
        record.error = Some(error.to_string());
        record
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Aggregates over the stored history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistoryStats {
    pub total_runs: i64,
    pub successful_runs: i64,
    pub failed_runs: i64,
    pub total_created: i64,
    pub total_updated: i64,
    pub total_deleted: i64,
    pub average_duration_ms: Option<f64>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl SyncHistoryStats {
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_runs > 0).then(|| self.successful_runs as f64 / self.total_runs as f64)
    }
}
