mod config;
mod main_lib;
mod scheduler;

use anyhow::bail;
use config::Config;
use main_lib::{build_state, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let state = build_state(&config).await?;

    if !config.sync_interval.is_zero() {
        scheduler::run_scheduler(state, config.sync_interval).await;
        return Ok(());
    }

    let result = state.run_sync().await?;
    state.prune_history().await;
    tracing::info!("{}", result.summary());
    if !result.is_success() {
        bail!("every attempted action failed ({} failures)", result.failed);
    }
    Ok(())
}
