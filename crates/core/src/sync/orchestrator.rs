//! Runs one reconciliation: fetch, plan, execute, record.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::entries::DestinationClient;
use crate::errors::{Error, Result};
use crate::mappings::IdentityStoreTrait;
use crate::settings::SyncSettings;
use crate::sync::executor::{describe_plan, ExecutionEngine};
use crate::sync::history_model::SyncRunRecord;
use crate::sync::history_traits::SyncHistoryRepositoryTrait;
use crate::sync::planner::ReconciliationPlanner;
use crate::sync::progress::{SyncPhase, SyncProgressReporter};
use crate::sync::result_model::SyncRunResult;
use crate::sync::routing::RoutingTable;
use crate::sync::window::SyncWindow;
use crate::worklogs::SourceClient;

/// Orchestrates a sync run between one source and one destination.
///
/// Runs must not overlap against the same identity store; callers
/// serialize them.
///
/// # Example
///
/// ```ignore
/// let orchestrator = SyncOrchestrator::new(source, destination, store, reporter, settings)
///     .with_history(history);
/// let result = orchestrator.run(SyncWindow::last_days(today, 30)).await?;
/// ```
pub struct SyncOrchestrator<P: SyncProgressReporter> {
    source: Arc<dyn SourceClient>,
    destination: Arc<dyn DestinationClient>,
    store: Arc<dyn IdentityStoreTrait>,
    history: Option<Arc<dyn SyncHistoryRepositoryTrait>>,
    progress_reporter: Arc<P>,
    settings: SyncSettings,
}

impl<P: SyncProgressReporter> SyncOrchestrator<P> {
    pub fn new(
        source: Arc<dyn SourceClient>,
        destination: Arc<dyn DestinationClient>,
        store: Arc<dyn IdentityStoreTrait>,
        progress_reporter: Arc<P>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            destination,
            store,
            history: None,
            progress_reporter,
            settings,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn SyncHistoryRepositoryTrait>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Reconciles `window`.
    ///
    /// Returns `Err` when a snapshot could not be fetched or the store
    /// failed during planning. Item failures are reported in the result.
    pub async fn run(&self, window: SyncWindow) -> Result<SyncRunResult> {
        let mut result = SyncRunResult::new(Uuid::now_v7().to_string(), window, Utc::now());
        result.dry_run = self.settings.dry_run;

        info!("Starting sync {} for {}", result.run_id, window);
        self.progress_reporter.report_sync_start(&window);

        let outcome = self.run_internal(&mut result).await;
        result.finished_at = Utc::now();

        match outcome {
            Ok(()) => {
                self.record_history(SyncRunRecord::from_result(&result))
                    .await;
                self.progress_reporter.report_sync_complete(&result);
                Ok(result)
            }
            Err(err) => {
                error!("Sync {} aborted: {}", result.run_id, err);
                self.record_history(SyncRunRecord::aborted(&result, &err))
                    .await;
                self.progress_reporter.report_sync_failed(&err);
                Err(err)
            }
        }
    }

    async fn run_internal(&self, result: &mut SyncRunResult) -> Result<()> {
        let window = result.window;

        self.progress_reporter
            .report_phase(SyncPhase::FetchingSource);
        let fetch = self
            .source
            .fetch_worklogs(&window, &self.settings.filter)
            .await
            .map_err(|e| Error::fetch("source worklogs", e))?;
        let mut worklogs = fetch.worklogs;
        worklogs.retain(|w| self.settings.filter.matches(w));
        info!("Fetched {} worklogs", worklogs.len());
        if !fetch.unreadable.is_empty() {
            warn!(
                "{} worklogs could not be read, their entries are left untouched: {}",
                fetch.unreadable.len(),
                fetch.unreadable.join(", ")
            );
        }

        self.progress_reporter
            .report_phase(SyncPhase::FetchingDestination);
        let entries = self
            .destination
            .fetch_entries(&window)
            .await
            .map_err(|e| Error::fetch("destination entries", e))?;
        let projects = self
            .destination
            .list_projects()
            .await
            .map_err(|e| Error::fetch("destination projects", e))?;
        let tasks = self
            .destination
            .list_tasks()
            .await
            .map_err(|e| Error::fetch("destination tasks", e))?;
        info!(
            "Fetched {} destination entries, {} projects, {} tasks",
            entries.len(),
            projects.len(),
            tasks.len()
        );
        let routing = RoutingTable::build(projects, tasks, self.settings.routing.clone());

        self.progress_reporter.report_phase(SyncPhase::Planning);
        let planner = ReconciliationPlanner::new(self.store.clone(), self.settings.clone())
            .for_window(window)
            .with_unreadable_sources(fetch.unreadable);
        let plan = planner.plan(&worklogs, &entries).await?;
        result.source_count = plan.source_count;
        result.destination_count = plan.destination_count;
        result.unchanged = plan.unchanged;

        if self.settings.dry_run {
            info!("Dry run, {} planned actions not executed", plan.action_count());
            for action in describe_plan(&plan) {
                self.progress_reporter.report_action(&action);
                result.record(action);
            }
            return Ok(());
        }

        if plan.is_empty() {
            debug!("Nothing to do");
            return Ok(());
        }

        self.progress_reporter.report_phase(SyncPhase::Executing);
        let engine = ExecutionEngine::new(
            self.store.clone(),
            self.destination.clone(),
            self.settings.clone(),
        );
        engine.execute(plan, &routing, result).await;
        for action in &result.actions {
            self.progress_reporter.report_action(action);
        }
        Ok(())
    }

    /// History is best effort; a failed write never fails the run.
    async fn record_history(&self, record: SyncRunRecord) {
        let Some(history) = &self.history else {
            return;
        };
        self.progress_reporter.report_phase(SyncPhase::Recording);
        if let Err(e) = history.record(record).await {
            error!("Failed to record sync history: {}", e);
        }
    }
}
