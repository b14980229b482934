//! Progress reporting for sync runs.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::sync::result_model::{ActionLogEntry, ActionOutcome, SyncRunResult};
use crate::sync::window::SyncWindow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    FetchingSource,
    FetchingDestination,
    Planning,
    Executing,
    Recording,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::FetchingSource => write!(f, "fetching_source"),
            SyncPhase::FetchingDestination => write!(f, "fetching_destination"),
            SyncPhase::Planning => write!(f, "planning"),
            SyncPhase::Executing => write!(f, "executing"),
            SyncPhase::Recording => write!(f, "recording"),
        }
    }
}

/// Trait for reporting sync progress.
pub trait SyncProgressReporter: Send + Sync {
    fn report_sync_start(&self, window: &SyncWindow);

    fn report_phase(&self, phase: SyncPhase);

    fn report_action(&self, action: &ActionLogEntry);

    /// The run finished, possibly with item failures.
    fn report_sync_complete(&self, result: &SyncRunResult);

    /// The run aborted before or during planning.
    fn report_sync_failed(&self, error: &Error);
}

/// A no-op progress reporter for contexts where progress reporting is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoOpProgressReporter;

impl SyncProgressReporter for NoOpProgressReporter {
    fn report_sync_start(&self, _window: &SyncWindow) {}

    fn report_phase(&self, _phase: SyncPhase) {}

    fn report_action(&self, _action: &ActionLogEntry) {}

    fn report_sync_complete(&self, _result: &SyncRunResult) {}

    fn report_sync_failed(&self, _error: &Error) {}
}

/// Writes the change summary to the log.
#[derive(Debug, Clone, Default)]
pub struct LogProgressReporter;

impl SyncProgressReporter for LogProgressReporter {
    fn report_sync_start(&self, window: &SyncWindow) {
        info!("Sync started for {}", window);
    }

    fn report_phase(&self, phase: SyncPhase) {
        info!("Sync phase: {}", phase);
    }

    fn report_action(&self, action: &ActionLogEntry) {
        let key = action.container_key.as_deref().unwrap_or("-");
        let source = action.source_id.as_deref().unwrap_or("-");
        match (&action.outcome, &action.error) {
            (ActionOutcome::Failed, Some(error)) => {
                warn!("{} {} (worklog {}) failed: {}", action.kind, key, source, error)
            }
            (outcome, _) => info!(
                "{} {} (worklog {}) {:?}{}",
                action.kind,
                key,
                source,
                outcome,
                action
                    .detail
                    .as_deref()
                    .map(|d| format!(": {}", d))
                    .unwrap_or_default()
            ),
        }
    }

    fn report_sync_complete(&self, result: &SyncRunResult) {
        if result.is_success() {
            info!("Sync {} complete: {}", result.run_id, result.summary());
        } else {
            warn!("Sync {} failed for every item: {}", result.run_id, result.summary());
        }
    }

    fn report_sync_failed(&self, error: &Error) {
        warn!("Sync aborted: {}", error);
    }
}
