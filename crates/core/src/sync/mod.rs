//! Sync module - reconciliation planner, execution engine and run orchestration.

pub mod description;
pub mod diff;
mod executor;
mod history_model;
mod history_traits;
mod orchestrator;
mod plan_model;
mod planner;
mod progress;
mod result_model;
mod routing;
mod window;

#[cfg(test)]
mod testing;




pub use diff::DriftReason;
pub use executor::{describe_plan, ExecutionEngine};
pub use history_model::{SyncHistoryStats, SyncRunRecord};
pub use history_traits::SyncHistoryRepositoryTrait;
pub use orchestrator::SyncOrchestrator;
pub use plan_model::{
    DeleteReason, PlannedCreate, PlannedDelete, PlannedUpdate, SyncPlan, UpdateReason,
};
pub use planner::ReconciliationPlanner;
pub use progress::{LogProgressReporter, NoOpProgressReporter, SyncPhase, SyncProgressReporter};
pub use result_model::{ActionKind, ActionLogEntry, ActionOutcome, SyncRunResult};
pub use routing::{Route, RoutingTable};
pub use window::SyncWindow;
