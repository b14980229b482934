use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::window::SyncWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    /// Recreated after the entry vanished from the destination.
    Recovered,
    Failed,
    /// Dry run: planned but not executed.
    Planned,
}

/// One line of the human-readable change summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    pub kind: ActionKind,
    pub source_id: Option<String>,
    pub container_key: Option<String>,
    pub destination_id: Option<String>,
    pub outcome: ActionOutcome,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl ActionLogEntry {
    pub fn new(kind: ActionKind, outcome: ActionOutcome) -> Self {
        Self {
            kind,
            source_id: None,
            container_key: None,
            destination_id: None,
            outcome,
            detail: None,
            error: None,
        }
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_container_key(mut self, container_key: impl Into<String>) -> Self {
        self.container_key = Some(container_key.into());
        self
    }

    pub fn with_destination(mut self, destination_id: impl Into<String>) -> Self {
        self.destination_id = Some(destination_id.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Counters and action log of a single run.
///
/// `created` counts fresh creates only. Recreates of entries that vanished
/// from the destination are counted in `recovered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunResult {
    pub run_id: String,
    pub window: SyncWindow,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub source_count: usize,
    pub destination_count: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub recovered: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub actions: Vec<ActionLogEntry>,
}

impl SyncRunResult {
    pub fn new(run_id: impl Into<String>, window: SyncWindow, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            window,
            started_at,
            finished_at: started_at,
            dry_run: false,
            source_count: 0,
            destination_count: 0,
            created: 0,
            updated: 0,
            deleted: 0,
            recovered: 0,
            failed: 0,
            unchanged: 0,
            actions: Vec::new(),
        }
    }

    /// Records an action and bumps the matching counter.
    pub fn record(&mut self, entry: ActionLogEntry) {
        match (entry.outcome, entry.kind) {
            (ActionOutcome::Failed, _) => self.failed += 1,
            (ActionOutcome::Recovered, _) => self.recovered += 1,
            (ActionOutcome::Succeeded, ActionKind::Create) => self.created += 1,
            (ActionOutcome::Succeeded, ActionKind::Update) => self.updated += 1,
            (ActionOutcome::Succeeded, ActionKind::Delete) => self.deleted += 1,
            (ActionOutcome::Planned, _) => {}
        }
        self.actions.push(entry);
    }

    pub fn attempted(&self) -> usize {
        self.created + self.updated + self.deleted + self.recovered + self.failed
    }

    /// A run fails only when it attempted something and every attempt failed.
    pub fn is_success(&self) -> bool {
        let attempted = self.attempted();
        attempted == 0 || self.failed < attempted
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.actions
            .iter()
            .filter(|a| a.outcome == ActionOutcome::Failed)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} worklogs: {} created, {} updated, {} deleted, {} recovered, {} failed, {} unchanged{}",
            self.source_count,
            self.created,
            self.updated,
            self.deleted,
            self.recovered,
            self.failed,
            self.unchanged,
            if self.dry_run { " (dry run)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn result() -> SyncRunResult {
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        SyncRunResult::new("run-1", SyncWindow { start: day, end: day }, Utc::now())
    }

    #[test]
    fn test_counters_follow_outcomes() {
        let mut run = result();
        run.record(ActionLogEntry::new(ActionKind::Create, ActionOutcome::Succeeded));
        run.record(ActionLogEntry::new(ActionKind::Create, ActionOutcome::Recovered));
        run.record(ActionLogEntry::new(ActionKind::Update, ActionOutcome::Succeeded));
        run.record(ActionLogEntry::new(ActionKind::Delete, ActionOutcome::Failed));

        assert_eq!(run.created, 1);
        assert_eq!(run.recovered, 1);
        assert_eq!(run.updated, 1);
        assert_eq!(run.deleted, 0);
        assert_eq!(run.failed, 1);
        assert_eq!(run.attempted(), 4);
        assert!(run.is_success());
        assert_eq!(run.failures().count(), 1);
    }

    #[test]
    fn test_all_failed_is_failure() {
        let mut run = result();
        assert!(run.is_success());

        run.record(ActionLogEntry::new(ActionKind::Create, ActionOutcome::Failed));
        run.record(ActionLogEntry::new(ActionKind::Update, ActionOutcome::Failed));
        assert!(!run.is_success());
    }

    #[test]
    fn test_planned_actions_do_not_count() {
        let mut run = result();
        run.record(ActionLogEntry::new(ActionKind::Create, ActionOutcome::Planned));
        assert_eq!(run.attempted(), 0);
        assert_eq!(run.actions.len(), 1);
        assert!(run.is_success());
    }
}
