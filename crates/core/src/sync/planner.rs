//! Two-phase reconciliation planner.
//!
//! Phase A brings the identity store in line with the source snapshot
//! without touching the destination. Phase B turns each mapping into at most
//! one destination action, then collects deletes for vanished sources and
//! for orphaned entries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::entries::DestinationEntry;
use crate::errors::Result;
use crate::mappings::{IdentityMapping, IdentityStoreTrait, MappingUpsert};
use crate::settings::SyncSettings;
use crate::sync::description::{has_correlation_marker, parse_container_key, parse_correlation_id};
use crate::sync::diff::{differs_from_source, source_fingerprint};
use crate::sync::plan_model::{
    DeleteReason, PlannedCreate, PlannedDelete, PlannedUpdate, SyncPlan, UpdateReason,
};
use crate::sync::window::SyncWindow;
use crate::worklogs::SourceWorklog;

pub struct ReconciliationPlanner {
    store: Arc<dyn IdentityStoreTrait>,
    settings: SyncSettings,
    window: Option<SyncWindow>,
    unreadable: HashSet<String>,
}

impl ReconciliationPlanner {
    pub fn new(store: Arc<dyn IdentityStoreTrait>, settings: SyncSettings) -> Self {
        Self {
            store,
            settings,
            window: None,
            unreadable: HashSet::new(),
        }
    }

    /// Limits delete candidates to the fetched window.
    ///
    /// Mappings whose last known work date lies outside `window` are neither
    /// deleted nor cleaned up, and only entries dated inside it can be
    /// orphans. Without a window every mapping and entry is in scope.
    pub fn for_window(mut self, window: SyncWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Source ids that exist upstream but could not be read this run.
    ///
    /// Their mappings count as processed and their entries are never
    /// deleted, neither as vanished sources nor as orphans.
    pub fn with_unreadable_sources<I>(mut self, source_ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.unreadable.extend(source_ids);
        self
    }

    fn mapping_in_scope(&self, mapping: &IdentityMapping) -> bool {
        match (&self.window, mapping.last_work_date) {
            (Some(window), Some(date)) => window.contains(date),
            _ => true,
        }
    }

    fn entry_in_scope(&self, entry: &DestinationEntry) -> bool {
        match &self.window {
            Some(window) => window.contains(
                entry
                    .start
                    .with_timezone(&self.settings.source_timezone)
                    .date_naive(),
            ),
            None => true,
        }
    }

    /// Builds the plan for one run.
    ///
    /// Store bookkeeping (new mappings, staged fingerprints, processed flags,
    /// removal of mappings with nothing left to delete) is persisted as it
    /// happens, also in dry-run mode.
    pub async fn plan(
        &self,
        worklogs: &[SourceWorklog],
        entries: &[DestinationEntry],
    ) -> Result<SyncPlan> {
        let worklogs = dedupe(worklogs);
        let entries_by_id: HashMap<&str, &DestinationEntry> = entries
            .iter()
            .map(|e| (e.destination_id.as_str(), e))
            .collect();

        let mut plan = SyncPlan {
            source_count: worklogs.len(),
            destination_count: entries.len(),
            ..Default::default()
        };

        self.store.reset_processed().await?;

        // Phase A
        plan.recovered_mappings = self.recover_mappings(&worklogs, entries).await?;
        self.stage_source_changes(&worklogs).await?;
        let present: HashSet<&str> = worklogs
            .iter()
            .map(|w| w.source_id.as_str())
            .chain(self.unreadable.iter().map(String::as_str))
            .collect();
        self.remove_orphaned_mappings(&present, &entries_by_id)
            .await?;

        // Phase B
        for worklog in &worklogs {
            self.plan_worklog(worklog, &entries_by_id, &mut plan)
                .await?;
            self.store.mark_processed(&worklog.source_id).await?;
        }
        for source_id in &self.unreadable {
            if self.store.get(source_id)?.is_some() {
                debug!("Keeping mapping {} of unreadable worklog", source_id);
                self.store.mark_processed(source_id).await?;
            }
        }

        for mapping in self.store.unprocessed()? {
            if !self.mapping_in_scope(&mapping) {
                continue;
            }
            match mapping.destination_id {
                Some(destination_id) => plan.deletes.push(PlannedDelete {
                    source_id: Some(mapping.source_id),
                    container_key: Some(mapping.container_key),
                    destination_id,
                    reason: DeleteReason::SourceRemoved,
                }),
                None => {
                    debug!(
                        "Dropping never-created mapping {} for vanished source",
                        mapping.source_id
                    );
                    self.store.remove(&mapping.source_id).await?;
                }
            }
        }

        let referenced: HashSet<String> = self
            .store
            .list()?
            .into_iter()
            .filter_map(|m| m.destination_id)
            .collect();
        for entry in entries {
            if !has_correlation_marker(&entry.description)
                || referenced.contains(&entry.destination_id)
                || !self.entry_in_scope(entry)
                || parse_correlation_id(&entry.description)
                    .is_some_and(|id| self.unreadable.contains(id))
            {
                continue;
            }
            debug!(
                "Entry {} carries a correlation marker but has no mapping",
                entry.destination_id
            );
            plan.deletes.push(PlannedDelete {
                source_id: parse_correlation_id(&entry.description).map(str::to_string),
                container_key: parse_container_key(&entry.description).map(str::to_string),
                destination_id: entry.destination_id.clone(),
                reason: DeleteReason::Orphan,
            });
        }

        info!(
            "Planned {} creates ({} recoveries), {} updates, {} deletes, {} unchanged",
            plan.creates.len(),
            plan.recovery_count(),
            plan.updates.len(),
            plan.deletes.len(),
            plan.unchanged
        );
        Ok(plan)
    }

    /// Rebuilds mappings from correlation markers when the store is empty.
    ///
    /// Never runs against a partially populated store. Only entries inside
    /// the window are considered, since worklogs outside it were not fetched.
    /// When several entries carry the same marker the first one wins and the
    /// others end up as orphans.
    async fn recover_mappings(
        &self,
        worklogs: &[&SourceWorklog],
        entries: &[DestinationEntry],
    ) -> Result<usize> {
        if worklogs.is_empty() || self.store.count()? > 0 {
            return Ok(0);
        }

        let container_keys: HashMap<&str, &str> = worklogs
            .iter()
            .map(|w| (w.source_id.as_str(), w.container_key.as_str()))
            .collect();
        let mut seen = HashSet::new();

        for entry in entries {
            let Some(source_id) = parse_correlation_id(&entry.description) else {
                continue;
            };
            if !self.entry_in_scope(entry) {
                debug!(
                    "Entry {} lies outside the window, not recovering {}",
                    entry.destination_id, source_id
                );
                continue;
            }
            if !seen.insert(source_id.to_string()) {
                warn!(
                    "Entry {} repeats correlation marker {}, leaving it unmapped",
                    entry.destination_id, source_id
                );
                continue;
            }
            let container_key = parse_container_key(&entry.description)
                .or_else(|| container_keys.get(source_id).copied())
                .unwrap_or_default();
            self.store
                .put(MappingUpsert::recovered(
                    source_id,
                    entry.destination_id.clone(),
                    container_key,
                ))
                .await?;
        }

        if !seen.is_empty() {
            info!(
                "Identity store was empty, recovered {} mappings from destination descriptions",
                seen.len()
            );
        }
        Ok(seen.len())
    }

    /// Creates pending mappings for new worklogs and stages changed ones.
    async fn stage_source_changes(&self, worklogs: &[&SourceWorklog]) -> Result<()> {
        for worklog in worklogs {
            let fingerprint = source_fingerprint(worklog);
            if !self.store.has_changed(&worklog.source_id, &fingerprint)? {
                continue;
            }

            match self.store.get(&worklog.source_id)? {
                None => {
                    self.store
                        .put(MappingUpsert::pending(
                            worklog.source_id.clone(),
                            worklog.container_key.clone(),
                            fingerprint,
                            Some(worklog.last_modified_at.clone()),
                        ))
                        .await?;
                }
                Some(_) => {
                    debug!("Worklog {} changed since last push", worklog.source_id);
                    self.store
                        .stage_update(
                            &worklog.source_id,
                            fingerprint,
                            Some(worklog.last_modified_at.clone()),
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Removes mappings of vanished sources that have nothing left to delete.
    ///
    /// Mappings whose entry is still live stay behind as delete candidates.
    async fn remove_orphaned_mappings(
        &self,
        present: &HashSet<&str>,
        entries_by_id: &HashMap<&str, &DestinationEntry>,
    ) -> Result<()> {
        let mut removed = 0;
        for mapping in self.store.list()? {
            if present.contains(mapping.source_id.as_str()) || !self.mapping_in_scope(&mapping) {
                continue;
            }
            let entry_is_live = mapping
                .destination_id
                .as_deref()
                .is_some_and(|id| entries_by_id.contains_key(id));
            if !entry_is_live && self.store.remove(&mapping.source_id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Removed {} mappings whose source and entry are both gone", removed);
        }
        Ok(())
    }

    async fn plan_worklog(
        &self,
        worklog: &SourceWorklog,
        entries_by_id: &HashMap<&str, &DestinationEntry>,
        plan: &mut SyncPlan,
    ) -> Result<()> {
        let mapping = match self.store.get(&worklog.source_id)? {
            Some(mapping) => mapping,
            None => {
                // Only reachable when the row exists but cannot be decoded.
                warn!(
                    "Mapping for worklog {} is unreadable, scheduling a create",
                    worklog.source_id
                );
                plan.creates.push(PlannedCreate {
                    worklog: worklog.clone(),
                    recovery: false,
                    previous_destination_id: None,
                });
                return Ok(());
            }
        };

        let Some(destination_id) = mapping.destination_id.clone() else {
            plan.creates.push(PlannedCreate {
                worklog: worklog.clone(),
                recovery: false,
                previous_destination_id: None,
            });
            return Ok(());
        };

        let Some(entry) = entries_by_id.get(destination_id.as_str()) else {
            info!(
                "Entry {} for worklog {} is gone from the destination, recreating",
                destination_id, worklog.source_id
            );
            plan.creates.push(PlannedCreate {
                worklog: worklog.clone(),
                recovery: true,
                previous_destination_id: Some(destination_id),
            });
            return Ok(());
        };

        if mapping.needs_update {
            plan.updates.push(PlannedUpdate {
                worklog: worklog.clone(),
                destination_id,
                reason: UpdateReason::SourceChanged,
                detail: None,
            });
            return Ok(());
        }

        if let Some(reason) = differs_from_source(
            entry,
            worklog,
            &self.settings.tolerance,
            self.settings.source_timezone,
        ) {
            info!(
                "Entry {} drifted from worklog {}: {}",
                destination_id, worklog.source_id, reason
            );
            plan.updates.push(PlannedUpdate {
                worklog: worklog.clone(),
                destination_id,
                reason: UpdateReason::Drift,
                detail: Some(reason.to_string()),
            });
            return Ok(());
        }

        plan.unchanged += 1;
        if self
            .store
            .needs_existence_check(&worklog.source_id, self.settings.verify_staleness_hours)?
        {
            self.store.mark_verified(&worklog.source_id).await?;
        }
        Ok(())
    }
}

/// First occurrence of each source id, in input order.
fn dedupe(worklogs: &[SourceWorklog]) -> Vec<&SourceWorklog> {
    let mut seen = HashSet::new();
    worklogs
        .iter()
        .filter(|w| {
            let first = seen.insert(w.source_id.as_str());
            if !first {
                warn!("Worklog {} returned twice by the source, ignoring the duplicate", w.source_id);
            }
            first
        })
        .collect()
}
