use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::sync::history_model::{SyncHistoryStats, SyncRunRecord};

/// Trait for run history persistence.
#[async_trait]
pub trait SyncHistoryRepositoryTrait: Send + Sync {
    async fn record(&self, run: SyncRunRecord) -> Result<()>;

    /// Most recent runs first.
    fn list_recent(&self, limit: i64) -> Result<Vec<SyncRunRecord>>;

    fn stats(&self) -> Result<SyncHistoryStats>;

    /// Deletes runs started before `cutoff`. Returns the number of rows removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
