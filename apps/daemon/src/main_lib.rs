use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use timesync_connect::{JiraClient, RetryPolicy, SolidtimeClient, TempoClient};
use timesync_core::mappings::IdentityStoreTrait;
use timesync_core::sync::{
    LogProgressReporter, SyncHistoryRepositoryTrait, SyncOrchestrator, SyncRunResult, SyncWindow,
};
use timesync_storage_sqlite::{
    db::{self, write_actor},
    IdentityMappingRepository, SyncHistoryRepository,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub orchestrator: SyncOrchestrator<LogProgressReporter>,
    pub history: Arc<dyn SyncHistoryRepositoryTrait>,
    pub days_back: i64,
    pub history_retention_days: i64,
}

impl AppState {
    /// Window ending today in the source time zone.
    pub fn current_window(&self) -> SyncWindow {
        let today = Utc::now()
            .with_timezone(&self.orchestrator.settings().source_timezone)
            .date_naive();
        SyncWindow::last_days(today, self.days_back)
    }

    pub async fn run_sync(&self) -> timesync_core::Result<SyncRunResult> {
        self.orchestrator.run(self.current_window()).await
    }

    /// Drops history rows older than the retention period. Failures are logged.
    pub async fn prune_history(&self) {
        if self.history_retention_days <= 0 {
            return;
        }
        let cutoff = Utc::now() - ChronoDuration::days(self.history_retention_days);
        match self.history.prune_older_than(cutoff).await {
            Ok(0) => {}
            Ok(removed) => tracing::info!("Pruned {} sync runs older than {}", removed, cutoff),
            Err(e) => tracing::warn!("Failed to prune sync history: {}", e),
        }
    }
}

pub fn init_tracing() {
    let log_format = std::env::var("TS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = write_actor::spawn_writer((*pool).clone());

    let store: Arc<dyn IdentityStoreTrait> =
        Arc::new(IdentityMappingRepository::new(pool.clone(), writer.clone()));
    let history: Arc<dyn SyncHistoryRepositoryTrait> =
        Arc::new(SyncHistoryRepository::new(pool.clone(), writer.clone()));
    tracing::info!("Identity store holds {} mappings", store.count()?);

    let retry = RetryPolicy::new(config.http_max_retries);
    let mut tempo = TempoClient::new(
        &config.tempo_base_url,
        &config.tempo_api_token,
        config.http_timeout,
        retry,
    )?;
    match &config.jira {
        Some(jira) => {
            tempo = tempo.with_jira(JiraClient::new(
                &jira.base_url,
                &jira.user_email,
                &jira.api_token,
                config.http_timeout,
                retry,
            )?);
        }
        None => tracing::warn!(
            "JIRA_BASE_URL not set: issue summaries and types are unavailable, worklogs need embedded issue keys"
        ),
    }

    let solidtime = SolidtimeClient::connect(
        &config.solidtime_base_url,
        &config.solidtime_api_token,
        &config.solidtime_organization_id,
        config.http_timeout,
        retry,
    )
    .await?;

    let orchestrator = SyncOrchestrator::new(
        Arc::new(tempo),
        Arc::new(solidtime),
        store,
        Arc::new(LogProgressReporter),
        config.sync.clone(),
    )
    .with_history(history.clone());

    Ok(Arc::new(AppState {
        orchestrator,
        history,
        days_back: config.days_back,
        history_retention_days: config.history_retention_days,
    }))
}
