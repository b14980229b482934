//! In-memory collaborators for engine tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::entries::{
    DeleteOutcome, DestinationClient, DestinationEntry, DestinationProject, DestinationTask,
    NewTimeEntry, TimeEntryUpdate, UpdateOutcome,
};
use crate::errors::{ApiError, Error, Result};
use crate::mappings::{Fingerprint, IdentityMapping, IdentityStoreTrait, MappingUpsert};
use crate::sync::description::{canonical_description, parse_correlation_id};
use crate::sync::diff::{source_fingerprint, source_start_utc};
use crate::sync::history_model::{SyncHistoryStats, SyncRunRecord};
use crate::sync::history_traits::SyncHistoryRepositoryTrait;
use crate::sync::window::SyncWindow;
use crate::worklogs::{SourceClient, SourceWorklog, WorklogFetch, WorklogFilter};

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}

pub fn window() -> SyncWindow {
    SyncWindow {
        start: day(1),
        end: day(31),
    }
}

pub fn worklog(source_id: &str, container_key: &str, duration_seconds: i64) -> SourceWorklog {
    SourceWorklog {
        source_id: source_id.to_string(),
        container_key: container_key.to_string(),
        container_summary: None,
        container_type: None,
        started_at: day(1).and_hms_opt(10, 0, 0).unwrap(),
        duration_seconds,
        billable_seconds: Some(duration_seconds),
        description: String::new(),
        last_modified_at: "2025-01-01T10:00:00Z".to_string(),
        author_account_id: None,
    }
}

/// A destination entry exactly as the engine would have written it.
pub fn entry_for(worklog: &SourceWorklog, destination_id: &str) -> DestinationEntry {
    let start = source_start_utc(worklog, Tz::UTC);
    DestinationEntry {
        destination_id: destination_id.to_string(),
        start,
        end: Some(start + Duration::seconds(worklog.duration_seconds)),
        duration_seconds: worklog.duration_seconds,
        description: canonical_description(worklog),
        billable: true,
        project_id: Some("p-as".to_string()),
        task_id: None,
    }
}

/// A mapping that matches `worklog` and points at `destination_id`.
pub fn synced(worklog: &SourceWorklog, destination_id: &str) -> MappingUpsert {
    MappingUpsert::synced(
        worklog.source_id.clone(),
        destination_id,
        worklog.container_key.clone(),
        source_fingerprint(worklog),
        Some(worklog.last_modified_at.clone()),
    )
}

fn api_error(status: u16) -> Error {
    Error::Api(ApiError::Status {
        service: "fake".to_string(),
        status,
        message: "injected failure".to_string(),
    })
}

// ============================================================================
// Identity store
// ============================================================================

#[derive(Default)]
pub struct InMemoryIdentityStore {
    rows: Mutex<BTreeMap<String, IdentityMapping>>,
    /// Rows that exist but cannot be decoded.
    corrupt: Mutex<HashSet<String>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn corrupt(&self, source_id: &str) {
        self.corrupt.lock().unwrap().insert(source_id.to_string());
    }

    /// Raw row, bypassing corruption.
    pub fn row(&self, source_id: &str) -> Option<IdentityMapping> {
        self.rows.lock().unwrap().get(source_id).cloned()
    }

    pub fn set_verified_at(&self, source_id: &str, at: Option<DateTime<Utc>>) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(source_id) {
            row.last_verified_at = at;
        }
    }

    fn update_row(&self, source_id: &str, f: impl FnOnce(&mut IdentityMapping)) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(source_id) {
            f(row);
            row.updated_at = Utc::now();
        }
    }
}

#[async_trait]
impl IdentityStoreTrait for InMemoryIdentityStore {
    fn get(&self, source_id: &str) -> Result<Option<IdentityMapping>> {
        if self.corrupt.lock().unwrap().contains(source_id) {
            return Ok(None);
        }
        Ok(self.row(source_id))
    }

    fn list(&self) -> Result<Vec<IdentityMapping>> {
        let corrupt = self.corrupt.lock().unwrap().clone();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|m| !corrupt.contains(&m.source_id))
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<i64> {
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    fn unprocessed(&self) -> Result<Vec<IdentityMapping>> {
        Ok(self.list()?.into_iter().filter(|m| !m.processed).collect())
    }

    async fn put(&self, mapping: MappingUpsert) -> Result<IdentityMapping> {
        let now = Utc::now();
        self.corrupt.lock().unwrap().remove(&mapping.source_id);
        let mut rows = self.rows.lock().unwrap();
        let existing = rows.get(&mapping.source_id).cloned();
        let fp = mapping.fingerprint.as_ref();
        let row = IdentityMapping {
            source_id: mapping.source_id.clone(),
            destination_id: mapping.destination_id.clone(),
            container_key: mapping.container_key,
            last_duration_seconds: fp.map(|f| f.duration_seconds),
            last_description: fp.map(|f| f.description.clone()),
            last_work_date: fp.map(|f| f.work_date),
            source_updated_at: mapping.source_updated_at,
            last_verified_at: mapping.destination_id.as_ref().map(|_| now),
            needs_update: mapping.needs_update,
            processed: existing.as_ref().is_some_and(|e| e.processed),
            recovered: mapping.recovered,
            created_at: existing.as_ref().map(|e| e.created_at).unwrap_or(now),
            updated_at: now,
        };
        rows.insert(mapping.source_id, row.clone());
        Ok(row)
    }

    async fn remove(&self, source_id: &str) -> Result<bool> {
        self.corrupt.lock().unwrap().remove(source_id);
        Ok(self.rows.lock().unwrap().remove(source_id).is_some())
    }

    async fn mark_for_update(&self, source_id: &str) -> Result<()> {
        self.update_row(source_id, |row| row.needs_update = true);
        Ok(())
    }

    async fn clear_update_flag(&self, source_id: &str) -> Result<()> {
        self.update_row(source_id, |row| row.needs_update = false);
        Ok(())
    }

    async fn stage_update(
        &self,
        source_id: &str,
        fingerprint: Fingerprint,
        source_updated_at: Option<String>,
    ) -> Result<()> {
        self.update_row(source_id, |row| {
            row.last_duration_seconds = Some(fingerprint.duration_seconds);
            row.last_description = Some(fingerprint.description);
            row.last_work_date = Some(fingerprint.work_date);
            row.source_updated_at = source_updated_at;
            row.needs_update = true;
        });
        Ok(())
    }

    async fn mark_verified(&self, source_id: &str) -> Result<()> {
        self.update_row(source_id, |row| row.last_verified_at = Some(Utc::now()));
        Ok(())
    }

    async fn reset_processed(&self) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.values_mut() {
            row.processed = false;
        }
        Ok(rows.len())
    }

    async fn mark_processed(&self, source_id: &str) -> Result<()> {
        if let Some(row) = self.rows.lock().unwrap().get_mut(source_id) {
            row.processed = true;
        }
        Ok(())
    }
}

// ============================================================================
// Destination
// ============================================================================

#[derive(Default)]
pub struct FakeDestination {
    pub entries: Mutex<BTreeMap<String, DestinationEntry>>,
    pub projects: Vec<DestinationProject>,
    pub tasks: Vec<DestinationTask>,
    pub bulk: bool,
    next_id: Mutex<u32>,
    /// Source ids whose create fails.
    pub fail_creates: Mutex<HashSet<String>>,
    /// Destination ids whose update fails.
    pub fail_updates: Mutex<HashSet<String>>,
    /// Destination ids whose delete fails.
    pub fail_deletes: Mutex<HashSet<String>>,
    pub fail_fetch: bool,
    pub create_calls: Mutex<usize>,
    pub bulk_calls: Mutex<usize>,
    pub update_calls: Mutex<usize>,
    pub delete_calls: Mutex<usize>,
}

impl FakeDestination {
    /// A destination with projects `AS` and `OPS`.
    pub fn new() -> Self {
        Self {
            projects: vec![
                DestinationProject {
                    id: "p-as".to_string(),
                    name: "AS".to_string(),
                },
                DestinationProject {
                    id: "p-ops".to_string(),
                    name: "OPS".to_string(),
                },
            ],
            tasks: vec![DestinationTask {
                id: "t-general".to_string(),
                name: "General Work".to_string(),
                project_id: "p-as".to_string(),
            }],
            ..Default::default()
        }
    }

    pub fn with_bulk(mut self) -> Self {
        self.bulk = true;
        self
    }

    pub fn with_failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn insert(&self, entry: DestinationEntry) {
        self.entries
            .lock()
            .unwrap()
            .insert(entry.destination_id.clone(), entry);
    }

    pub fn entry(&self, destination_id: &str) -> Option<DestinationEntry> {
        self.entries.lock().unwrap().get(destination_id).cloned()
    }

    pub fn snapshot(&self) -> Vec<DestinationEntry> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    pub fn remove(&self, destination_id: &str) {
        self.entries.lock().unwrap().remove(destination_id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn create_one(&self, entry: &NewTimeEntry) -> Result<String> {
        if let Some(source_id) = parse_correlation_id(&entry.description) {
            if self.fail_creates.lock().unwrap().contains(source_id) {
                return Err(api_error(422));
            }
        }
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("new-{}", *next)
        };
        self.insert(DestinationEntry {
            destination_id: id.clone(),
            start: entry.start,
            end: Some(entry.end()),
            duration_seconds: entry.duration_seconds,
            description: entry.description.clone(),
            billable: entry.billable,
            project_id: Some(entry.project_id.clone()),
            task_id: entry.task_id.clone(),
        });
        Ok(id)
    }
}

#[async_trait]
impl DestinationClient for FakeDestination {
    async fn fetch_entries(&self, _window: &SyncWindow) -> Result<Vec<DestinationEntry>> {
        if self.fail_fetch {
            return Err(api_error(503));
        }
        Ok(self.snapshot())
    }

    async fn create_entry(&self, entry: &NewTimeEntry) -> Result<String> {
        *self.create_calls.lock().unwrap() += 1;
        self.create_one(entry)
    }

    fn supports_bulk_create(&self) -> bool {
        self.bulk
    }

    async fn create_entries(&self, entries: &[NewTimeEntry]) -> Result<Vec<Result<String>>> {
        *self.bulk_calls.lock().unwrap() += 1;
        Ok(entries.iter().map(|e| self.create_one(e)).collect())
    }

    async fn update_entry(
        &self,
        destination_id: &str,
        update: &TimeEntryUpdate,
    ) -> Result<UpdateOutcome> {
        *self.update_calls.lock().unwrap() += 1;
        if self.fail_updates.lock().unwrap().contains(destination_id) {
            return Err(api_error(500));
        }
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(destination_id) {
            Some(entry) => {
                entry.start = update.start;
                entry.end = Some(update.start + Duration::seconds(update.duration_seconds));
                entry.duration_seconds = update.duration_seconds;
                entry.description = update.description.clone();
                entry.billable = update.billable;
                Ok(UpdateOutcome::Updated)
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn delete_entry(&self, destination_id: &str) -> Result<DeleteOutcome> {
        *self.delete_calls.lock().unwrap() += 1;
        if self.fail_deletes.lock().unwrap().contains(destination_id) {
            return Err(api_error(500));
        }
        Ok(match self.entries.lock().unwrap().remove(destination_id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn list_projects(&self) -> Result<Vec<DestinationProject>> {
        Ok(self.projects.clone())
    }

    async fn list_tasks(&self) -> Result<Vec<DestinationTask>> {
        Ok(self.tasks.clone())
    }
}

// ============================================================================
// Source and history
// ============================================================================

#[derive(Default)]
pub struct FakeSource {
    pub worklogs: Mutex<Vec<SourceWorklog>>,
    pub unreadable: Mutex<Vec<String>>,
    pub fail: bool,
}

impl FakeSource {
    pub fn new(worklogs: Vec<SourceWorklog>) -> Self {
        Self {
            worklogs: Mutex::new(worklogs),
            unreadable: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn set(&self, worklogs: Vec<SourceWorklog>) {
        *self.worklogs.lock().unwrap() = worklogs;
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch_worklogs(
        &self,
        _window: &SyncWindow,
        _filter: &WorklogFilter,
    ) -> Result<WorklogFetch> {
        if self.fail {
            return Err(Error::Api(ApiError::Timeout {
                service: "fake".to_string(),
                message: "source unreachable".to_string(),
            }));
        }
        Ok(WorklogFetch {
            worklogs: self.worklogs.lock().unwrap().clone(),
            unreadable: self.unreadable.lock().unwrap().clone(),
        })
    }
}

#[derive(Default)]
pub struct InMemoryHistory {
    pub runs: Mutex<Vec<SyncRunRecord>>,
}

#[async_trait]
impl SyncHistoryRepositoryTrait for InMemoryHistory {
    async fn record(&self, run: SyncRunRecord) -> Result<()> {
        self.runs.lock().unwrap().push(run);
        Ok(())
    }

    fn list_recent(&self, limit: i64) -> Result<Vec<SyncRunRecord>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }

    fn stats(&self) -> Result<SyncHistoryStats> {
        let runs = self.runs.lock().unwrap();
        Ok(SyncHistoryStats {
            total_runs: runs.len() as i64,
            successful_runs: runs.iter().filter(|r| r.success).count() as i64,
            failed_runs: runs.iter().filter(|r| !r.success).count() as i64,
            ..Default::default()
        })
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut runs = self.runs.lock().unwrap();
        let before = runs.len();
        runs.retain(|r| r.started_at >= cutoff);
        Ok(before - runs.len())
    }
}
