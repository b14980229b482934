use serde::Serialize;

use crate::worklogs::SourceWorklog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCreate {
    pub worklog: SourceWorklog,
    /// The mapping pointed at an entry that no longer exists.
    pub recovery: bool,
    /// Id of the vanished entry, when `recovery` is set.
    pub previous_destination_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    /// The source record changed since the last push.
    SourceChanged,
    /// The destination entry was edited out-of-band.
    Drift,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub worklog: SourceWorklog,
    pub destination_id: String,
    pub reason: UpdateReason,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteReason {
    /// The mapped source record is gone.
    SourceRemoved,
    /// The entry carries a correlation marker no mapping references.
    Orphan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelete {
    /// `None` for orphans whose marker could not be parsed.
    pub source_id: Option<String>,
    pub container_key: Option<String>,
    pub destination_id: String,
    pub reason: DeleteReason,
}

/// Destination actions for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub creates: Vec<PlannedCreate>,
    pub updates: Vec<PlannedUpdate>,
    pub deletes: Vec<PlannedDelete>,
    pub unchanged: usize,
    pub source_count: usize,
    pub destination_count: usize,
    /// Mappings rebuilt from correlation markers before planning.
    pub recovered_mappings: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn action_count(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }

    pub fn recovery_count(&self) -> usize {
        self.creates.iter().filter(|c| c.recovery).count()
    }
}
