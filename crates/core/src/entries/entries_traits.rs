use async_trait::async_trait;

use crate::entries::entries_model::{
    DeleteOutcome, DestinationEntry, DestinationProject, DestinationTask, NewTimeEntry,
    TimeEntryUpdate, UpdateOutcome,
};
use crate::errors::Result;
use crate::sync::SyncWindow;

/// Contract for the destination time-entry service.
///
/// Implementations negotiate optional capabilities (such as bulk creation)
/// once at construction and report them through the `supports_*` methods.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    async fn fetch_entries(&self, window: &SyncWindow) -> Result<Vec<DestinationEntry>>;

    /// Create one entry and return the id the destination assigned to it.
    async fn create_entry(&self, entry: &NewTimeEntry) -> Result<String>;

    fn supports_bulk_create(&self) -> bool {
        false
    }

    /// Create several entries. The outer `Result` fails only when the whole
    /// call failed; per-item results are positional.
    async fn create_entries(&self, entries: &[NewTimeEntry]) -> Result<Vec<Result<String>>> {
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            results.push(self.create_entry(entry).await);
        }
        Ok(results)
    }

    async fn update_entry(
        &self,
        destination_id: &str,
        update: &TimeEntryUpdate,
    ) -> Result<UpdateOutcome>;

    async fn delete_entry(&self, destination_id: &str) -> Result<DeleteOutcome>;

    async fn list_projects(&self) -> Result<Vec<DestinationProject>>;

    async fn list_tasks(&self) -> Result<Vec<DestinationTask>>;
}
