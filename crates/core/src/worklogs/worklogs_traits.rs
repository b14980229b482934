use async_trait::async_trait;

use crate::errors::Result;
use crate::sync::SyncWindow;
use crate::worklogs::worklogs_model::{WorklogFetch, WorklogFilter};

/// Read side of the source of truth for logged work.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch every worklog started inside `window` (both ends inclusive)
    /// that passes `filter`.
    ///
    /// Worklogs that exist but cannot be turned into a [`SourceWorklog`] are
    /// reported in [`WorklogFetch::unreadable`] rather than dropped.
    async fn fetch_worklogs(
        &self,
        window: &SyncWindow,
        filter: &WorklogFilter,
    ) -> Result<WorklogFetch>;
}
