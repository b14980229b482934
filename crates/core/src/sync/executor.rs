//! Applies a [`SyncPlan`] against the destination.
//!
//! Every item succeeds or fails on its own and writes its own mapping.
//! Nothing is retried within a run: a failed item leaves the store in a
//! state that makes the next run pick it up again.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::entries::{DeleteOutcome, DestinationClient, NewTimeEntry, TimeEntryUpdate, UpdateOutcome};
use crate::errors::Result;
use crate::mappings::{IdentityStoreTrait, MappingUpsert};
use crate::settings::SyncSettings;
use crate::sync::description::canonical_description;
use crate::sync::diff::{source_fingerprint, source_start_utc};
use crate::sync::plan_model::{
    DeleteReason, PlannedCreate, PlannedDelete, PlannedUpdate, SyncPlan, UpdateReason,
};
use crate::sync::result_model::{ActionKind, ActionLogEntry, ActionOutcome, SyncRunResult};
use crate::sync::routing::RoutingTable;
use crate::worklogs::SourceWorklog;

pub struct ExecutionEngine {
    store: Arc<dyn IdentityStoreTrait>,
    destination: Arc<dyn DestinationClient>,
    settings: SyncSettings,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn IdentityStoreTrait>,
        destination: Arc<dyn DestinationClient>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            destination,
            settings,
        }
    }

    /// Executes deletes, then creates, then updates, recording every item
    /// into `result`.
    pub async fn execute(&self, plan: SyncPlan, routing: &RoutingTable, result: &mut SyncRunResult) {
        let SyncPlan {
            creates,
            updates,
            deletes,
            ..
        } = plan;

        for delete in deletes {
            let entry = self.apply_delete(delete).await;
            result.record(entry);
        }

        for entry in self.apply_creates(creates, routing).await {
            result.record(entry);
        }

        for update in updates {
            let entry = self.apply_update(update, routing).await;
            result.record(entry);
        }

        info!(
            "Execution finished: {} created, {} updated, {} deleted, {} recovered, {} failed",
            result.created, result.updated, result.deleted, result.recovered, result.failed
        );
    }

    async fn apply_delete(&self, delete: PlannedDelete) -> ActionLogEntry {
        let mut log = ActionLogEntry::new(ActionKind::Delete, ActionOutcome::Succeeded)
            .with_destination(delete.destination_id.clone())
            .with_detail(match delete.reason {
                DeleteReason::SourceRemoved => "source removed",
                DeleteReason::Orphan => "orphan",
            });
        if let Some(source_id) = &delete.source_id {
            log = log.with_source(source_id.clone());
        }
        if let Some(container_key) = &delete.container_key {
            log = log.with_container_key(container_key.clone());
        }

        match self.destination.delete_entry(&delete.destination_id).await {
            Ok(outcome) => {
                if outcome == DeleteOutcome::NotFound {
                    debug!("Entry {} was already gone", delete.destination_id);
                }
                // Orphans have no mapping of their own to drop.
                if delete.reason == DeleteReason::SourceRemoved {
                    if let Some(source_id) = &delete.source_id {
                        if let Err(e) = self.store.remove(source_id).await {
                            error!("Entry {} deleted but mapping {} kept: {}", delete.destination_id, source_id, e);
                            return failed(log, e);
                        }
                    }
                }
                log
            }
            Err(e) => {
                warn!("Failed to delete entry {}: {}", delete.destination_id, e);
                failed(log, e)
            }
        }
    }

    async fn apply_creates(
        &self,
        creates: Vec<PlannedCreate>,
        routing: &RoutingTable,
    ) -> Vec<ActionLogEntry> {
        let mut logs = Vec::with_capacity(creates.len());
        let mut ready: Vec<(PlannedCreate, NewTimeEntry)> = Vec::with_capacity(creates.len());

        for create in creates {
            match self.new_entry(&create.worklog, routing) {
                Ok(payload) => ready.push((create, payload)),
                Err(e) => {
                    warn!("Cannot route worklog {}: {}", create.worklog.source_id, e);
                    logs.push(failed(create_log(&create), e));
                }
            }
        }
        if ready.is_empty() {
            return logs;
        }

        let outcomes: Vec<std::result::Result<String, String>> =
            if ready.len() > 1 && self.destination.supports_bulk_create() {
                let payloads: Vec<NewTimeEntry> = ready.iter().map(|(_, p)| p.clone()).collect();
                debug!("Creating {} entries in bulk", payloads.len());
                match self.destination.create_entries(&payloads).await {
                    Ok(results) => {
                        let mut results: Vec<_> = results
                            .into_iter()
                            .map(|r| r.map_err(|e| e.to_string()))
                            .collect();
                        results.resize(
                            ready.len(),
                            Err("no result returned for this entry".to_string()),
                        );
                        results
                    }
                    Err(e) => {
                        let message = e.to_string();
                        warn!("Bulk create failed: {}", message);
                        vec![Err(message); ready.len()]
                    }
                }
            } else {
                let mut results = Vec::with_capacity(ready.len());
                for (_, payload) in &ready {
                    results.push(
                        self.destination
                            .create_entry(payload)
                            .await
                            .map_err(|e| e.to_string()),
                    );
                }
                results
            };

        for ((create, _), outcome) in ready.into_iter().zip(outcomes) {
            logs.push(self.finish_create(create, outcome).await);
        }
        logs
    }

    /// Writes the mapping for a created entry.
    async fn finish_create(
        &self,
        create: PlannedCreate,
        outcome: std::result::Result<String, String>,
    ) -> ActionLogEntry {
        let log = create_log(&create);
        let destination_id = match outcome {
            Ok(id) => id,
            Err(message) => {
                warn!("Failed to create entry for worklog {}: {}", create.worklog.source_id, message);
                return failed(log, message);
            }
        };

        let worklog = &create.worklog;
        let upsert = MappingUpsert::synced(
            worklog.source_id.clone(),
            destination_id.clone(),
            worklog.container_key.clone(),
            source_fingerprint(worklog),
            Some(worklog.last_modified_at.clone()),
        );
        let log = log.with_destination(destination_id.clone());
        match self.store.put(upsert).await {
            Ok(_) => {
                debug!("Created entry {} for worklog {}", destination_id, worklog.source_id);
                log
            }
            Err(e) => {
                error!(
                    "Entry {} created but mapping for worklog {} not saved: {}",
                    destination_id, worklog.source_id, e
                );
                failed(log, e)
            }
        }
    }

    async fn apply_update(&self, update: PlannedUpdate, routing: &RoutingTable) -> ActionLogEntry {
        let worklog = &update.worklog;
        let mut log = ActionLogEntry::new(ActionKind::Update, ActionOutcome::Succeeded)
            .with_source(worklog.source_id.clone())
            .with_container_key(worklog.container_key.clone())
            .with_destination(update.destination_id.clone());
        log = match (&update.reason, &update.detail) {
            (UpdateReason::Drift, Some(detail)) => log.with_detail(format!("drift: {}", detail)),
            (UpdateReason::Drift, None) => log.with_detail("drift"),
            (UpdateReason::SourceChanged, _) => log.with_detail("source changed"),
        };

        let payload = TimeEntryUpdate {
            start: source_start_utc(worklog, self.settings.source_timezone),
            duration_seconds: worklog.duration_seconds,
            description: canonical_description(worklog),
            billable: routing.billable(worklog),
        };

        match self
            .destination
            .update_entry(&update.destination_id, &payload)
            .await
        {
            Ok(UpdateOutcome::Updated) => {
                let upsert = MappingUpsert::synced(
                    worklog.source_id.clone(),
                    update.destination_id.clone(),
                    worklog.container_key.clone(),
                    source_fingerprint(worklog),
                    Some(worklog.last_modified_at.clone()),
                );
                match self.store.put(upsert).await {
                    Ok(_) => log,
                    Err(e) => {
                        error!("Entry {} updated but mapping not saved: {}", update.destination_id, e);
                        failed(log, e)
                    }
                }
            }
            Ok(UpdateOutcome::NotFound) => {
                info!(
                    "Entry {} vanished before update, recreating worklog {}",
                    update.destination_id, worklog.source_id
                );
                self.recreate(update, routing).await
            }
            Err(e) => {
                warn!("Failed to update entry {}: {}", update.destination_id, e);
                if let Err(store_err) = self.store.mark_for_update(&worklog.source_id).await {
                    error!("Could not flag worklog {} for retry: {}", worklog.source_id, store_err);
                }
                failed(log, e)
            }
        }
    }

    /// Update hit a missing entry: drop the stale mapping and run the create path.
    async fn recreate(&self, update: PlannedUpdate, routing: &RoutingTable) -> ActionLogEntry {
        let create = PlannedCreate {
            worklog: update.worklog,
            recovery: true,
            previous_destination_id: Some(update.destination_id),
        };

        if let Err(e) = self.store.remove(&create.worklog.source_id).await {
            return failed(create_log(&create), e);
        }

        let payload = match self.new_entry(&create.worklog, routing) {
            Ok(payload) => payload,
            Err(e) => return failed(create_log(&create), e),
        };
        let outcome = self
            .destination
            .create_entry(&payload)
            .await
            .map_err(|e| e.to_string());
        self.finish_create(create, outcome).await
    }

    fn new_entry(&self, worklog: &SourceWorklog, routing: &RoutingTable) -> Result<NewTimeEntry> {
        let route = routing.resolve(worklog)?;
        Ok(NewTimeEntry {
            project_id: route.project_id,
            task_id: route.task_id,
            start: source_start_utc(worklog, self.settings.source_timezone),
            duration_seconds: worklog.duration_seconds,
            description: canonical_description(worklog),
            billable: route.billable,
        })
    }
}

/// Action log entries a dry run reports instead of executing.
pub fn describe_plan(plan: &SyncPlan) -> Vec<ActionLogEntry> {
    let deletes = plan.deletes.iter().map(|d| {
        let mut log = ActionLogEntry::new(ActionKind::Delete, ActionOutcome::Planned)
            .with_destination(d.destination_id.clone());
        if let Some(source_id) = &d.source_id {
            log = log.with_source(source_id.clone());
        }
        if let Some(key) = &d.container_key {
            log = log.with_container_key(key.clone());
        }
        log
    });
    let creates = plan.creates.iter().map(|c| {
        let mut log = create_log(c);
        log.outcome = ActionOutcome::Planned;
        log
    });
    let updates = plan.updates.iter().map(|u| {
        let mut log = ActionLogEntry::new(ActionKind::Update, ActionOutcome::Planned)
            .with_source(u.worklog.source_id.clone())
            .with_container_key(u.worklog.container_key.clone())
            .with_destination(u.destination_id.clone());
        if let Some(detail) = &u.detail {
            log = log.with_detail(detail.clone());
        }
        log
    });
    deletes.chain(creates).chain(updates).collect()
}

fn create_log(create: &PlannedCreate) -> ActionLogEntry {
    let outcome = if create.recovery {
        ActionOutcome::Recovered
    } else {
        ActionOutcome::Succeeded
    };
    let log = ActionLogEntry::new(ActionKind::Create, outcome)
        .with_source(create.worklog.source_id.clone())
        .with_container_key(create.worklog.container_key.clone());
    match &create.previous_destination_id {
        Some(previous) => log.with_detail(format!("recreating vanished entry {}", previous)),
        None => log,
    }
}

fn failed(mut log: ActionLogEntry, error: impl ToString) -> ActionLogEntry {
    log.outcome = ActionOutcome::Failed;
    log.with_error(error)
}
