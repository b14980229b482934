use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono_tz::Tz;
use timesync_connect::{DEFAULT_MAX_RETRIES, DEFAULT_TEMPO_API_URL, DEFAULT_TIMEOUT_SECS};
use timesync_core::constants::{DEFAULT_DAYS_BACK, DEFAULT_HISTORY_RETENTION_DAYS};
use timesync_core::settings::{BillableRule, DriftTolerance, RoutingRules, SyncSettings};
use timesync_core::worklogs::WorklogFilter;

#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub user_email: String,
    pub api_token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub tempo_base_url: String,
    pub tempo_api_token: String,
    pub jira: Option<JiraConfig>,
    pub solidtime_base_url: String,
    pub solidtime_api_token: String,
    pub solidtime_organization_id: String,
    pub days_back: i64,
    /// Zero runs a single sync and exits.
    pub sync_interval: Duration,
    pub http_timeout: Duration,
    pub http_max_retries: u32,
    pub history_retention_days: i64,
    pub sync: SyncSettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| anyhow!("{} must be set", key));

        let jira = match get("JIRA_BASE_URL") {
            Some(base_url) => Some(JiraConfig {
                base_url,
                user_email: require("JIRA_USER_EMAIL")?,
                api_token: require("JIRA_API_TOKEN")?,
            }),
            None => None,
        };

        let source_timezone = match get("TS_SOURCE_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| anyhow!("Invalid TS_SOURCE_TIMEZONE '{}': {}", name, e))?,
            None => Tz::UTC,
        };

        let defaults = RoutingRules::default();
        let routing = RoutingRules {
            project_mappings: parse_pairs(get("TS_PROJECT_MAPPINGS").as_deref())
                .context("Invalid TS_PROJECT_MAPPINGS")?,
            task_mappings: parse_pairs(get("TS_TASK_MAPPINGS").as_deref())
                .context("Invalid TS_TASK_MAPPINGS")?,
            default_task: get("TS_DEFAULT_TASK").or(defaults.default_task),
            billable_default: match get("TS_BILLABLE_DEFAULT") {
                Some(rule) => rule.parse::<BillableRule>()?,
                None => defaults.billable_default,
            },
            billable_overrides: parse_pairs(get("TS_BILLABLE_OVERRIDES").as_deref())
                .context("Invalid TS_BILLABLE_OVERRIDES")?
                .into_iter()
                .map(|(key, rule)| Ok((key, rule.parse::<BillableRule>()?)))
                .collect::<anyhow::Result<_>>()?,
        };

        let default_tolerance = DriftTolerance::default();
        let sync = SyncSettings {
            tolerance: DriftTolerance {
                duration_seconds: parse_number(
                    get("TS_DURATION_TOLERANCE_SECS"),
                    default_tolerance.duration_seconds,
                )?,
                start_time_seconds: parse_number(
                    get("TS_START_TOLERANCE_SECS"),
                    default_tolerance.start_time_seconds,
                )?,
            },
            source_timezone,
            verify_staleness_hours: parse_number(
                get("TS_VERIFY_STALENESS_HOURS"),
                SyncSettings::default().verify_staleness_hours,
            )?,
            routing,
            filter: WorklogFilter {
                project_keys: parse_list(get("TS_PROJECT_KEYS").as_deref()),
                author_account_id: get("TS_AUTHOR_ACCOUNT_ID"),
            },
            dry_run: parse_bool(get("TS_DRY_RUN"))?,
        };

        Ok(Self {
            db_path: get("TS_DB_PATH").unwrap_or_else(|| "./db/timesync.db".into()),
            tempo_base_url: get("TEMPO_BASE_URL").unwrap_or_else(|| DEFAULT_TEMPO_API_URL.into()),
            tempo_api_token: require("TEMPO_API_TOKEN")?,
            jira,
            solidtime_base_url: require("SOLIDTIME_BASE_URL")?,
            solidtime_api_token: require("SOLIDTIME_API_TOKEN")?,
            solidtime_organization_id: require("SOLIDTIME_ORGANIZATION_ID")?,
            days_back: parse_number(get("TS_DAYS_BACK"), DEFAULT_DAYS_BACK)?,
            sync_interval: Duration::from_secs(parse_number(get("TS_SYNC_INTERVAL_SECS"), 0)?),
            http_timeout: Duration::from_secs(parse_number(
                get("TS_HTTP_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?),
            http_max_retries: parse_number(get("TS_HTTP_MAX_RETRIES"), DEFAULT_MAX_RETRIES)?,
            history_retention_days: parse_number(
                get("TS_HISTORY_RETENTION_DAYS"),
                DEFAULT_HISTORY_RETENTION_DAYS,
            )?,
            sync,
        })
    }
}

fn parse_number<T>(value: Option<String>, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("Invalid number '{}': {}", raw, e)),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>) -> anyhow::Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => bail!("Invalid boolean '{}'", other),
    }
}

/// Comma separated list, blanks dropped.
fn parse_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `KEY=Value,KEY2=Value 2`. Values may contain spaces but not commas.
fn parse_pairs(value: Option<&str>) -> anyhow::Result<HashMap<String, String>> {
    parse_list(value)
        .into_iter()
        .map(|pair| {
            let (key, val) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected KEY=Value, got '{}'", pair))?;
            let (key, val) = (key.trim(), val.trim());
            if key.is_empty() || val.is_empty() {
                bail!("expected KEY=Value, got '{}'", pair);
            }
            Ok((key.to_string(), val.to_string()))
        })
        .collect()
}
