use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A unit of logged work as reported by the source system.
///
/// Created fresh on every fetch and never mutated. `started_at` is a local
/// wall-clock time in the source time zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceWorklog {
    pub source_id: String,
    /// Issue key, e.g. `AS-1`.
    pub container_key: String,
    pub container_summary: Option<String>,
    /// Issue type name, e.g. `Bug`. Drives task routing.
    pub container_type: Option<String>,
    pub started_at: NaiveDateTime,
    pub duration_seconds: i64,
    pub billable_seconds: Option<i64>,
    pub description: String,
    pub last_modified_at: String,
    pub author_account_id: Option<String>,
}

impl SourceWorklog {
    pub fn work_date(&self) -> NaiveDate {
        self.started_at.date()
    }

    /// Project key portion of the container key (`AS` for `AS-1`).
    pub fn project_key(&self) -> &str {
        self.container_key
            .split('-')
            .next()
            .unwrap_or(&self.container_key)
    }
}

/// Everything one source fetch produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorklogFetch {
    pub worklogs: Vec<SourceWorklog>,
    /// Ids of worklogs the source still has but that could not be read.
    /// Their destination entries must be left alone.
    pub unreadable: Vec<String>,
}

/// Optional narrowing of a source fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogFilter {
    /// Only keep worklogs of these projects. Empty keeps everything.
    pub project_keys: Vec<String>,
    pub author_account_id: Option<String>,
}

impl WorklogFilter {
    pub fn matches(&self, worklog: &SourceWorklog) -> bool {
        if !self.project_keys.is_empty()
            && !self
                .project_keys
                .iter()
                .any(|key| key.eq_ignore_ascii_case(worklog.project_key()))
        {
            return false;
        }

        match (&self.author_account_id, &worklog.author_account_id) {
            (Some(wanted), Some(actual)) => wanted == actual,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}
