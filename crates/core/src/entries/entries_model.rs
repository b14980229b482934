use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A time entry as it currently exists in the destination service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationEntry {
    pub destination_id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub description: String,
    pub billable: bool,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
}

/// Payload for creating a time entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTimeEntry {
    pub project_id: String,
    pub task_id: Option<String>,
    pub start: DateTime<Utc>,
    pub duration_seconds: i64,
    pub description: String,
    pub billable: bool,
}

impl NewTimeEntry {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::seconds(self.duration_seconds)
    }
}

/// Payload for rewriting an existing time entry with source values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntryUpdate {
    pub start: DateTime<Utc>,
    pub duration_seconds: i64,
    pub description: String,
    pub billable: bool,
}

impl TimeEntryUpdate {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::seconds(self.duration_seconds)
    }
}

/// Result of an update call. Transport and validation failures are `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

/// Result of a delete call. Transport and validation failures are `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationProject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationTask {
    pub id: String,
    pub name: String,
    pub project_id: String,
}
