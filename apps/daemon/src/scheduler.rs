//! Repeats sync runs on a fixed interval, one at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::main_lib::AppState;

/// Runs syncs every `every` until Ctrl-C.
pub async fn run_scheduler(state: Arc<AppState>, every: Duration) {
    info!("Sync scheduler started ({}s interval)", every.as_secs());
    log_history(&state);

    let mut ticker = interval(every);
    // A run longer than the interval delays the next one instead of bunching.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => run_scheduled_sync(&state).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, stopping scheduler");
                break;
            }
        }
    }
}

async fn run_scheduled_sync(state: &Arc<AppState>) {
    match state.run_sync().await {
        Ok(result) if result.is_success() => info!("Scheduled sync finished: {}", result.summary()),
        Ok(result) => warn!("Scheduled sync had only failures: {}", result.summary()),
        Err(e) if e.is_transient() => warn!("Scheduled sync aborted, retrying next tick: {}", e),
        Err(e) => error!("Scheduled sync aborted: {}", e),
    }
    state.prune_history().await;
}

fn log_history(state: &AppState) {
    match state.history.stats() {
        Ok(stats) => info!(
            "Sync history: {} runs, {} successful, {} failed",
            stats.total_runs, stats.successful_runs, stats.failed_runs
        ),
        Err(e) => warn!("Failed to read sync history: {}", e),
    }
    if let Ok(recent) = state.history.list_recent(1) {
        if let Some(last) = recent.first() {
            info!(
                "Last run {} at {} ({})",
                last.id,
                last.started_at,
                if last.success { "succeeded" } else { "failed" }
            );
        }
    }
}
