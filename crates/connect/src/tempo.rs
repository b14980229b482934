//! Tempo worklog source.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info, warn};
use serde::Deserialize;

use timesync_core::errors::{Result, ValidationError};
use timesync_core::sync::SyncWindow;
use timesync_core::worklogs::{SourceClient, SourceWorklog, WorklogFetch, WorklogFilter};

use crate::http::{Auth, HttpClient, RetryPolicy};
use crate::jira::{JiraClient, JiraIssue};

pub const DEFAULT_TEMPO_API_URL: &str = "https://api.tempo.io";

const PAGE_SIZE: usize = 1000;

/// Start time Tempo implies when a worklog carries none.
const DEFAULT_START_TIME: &str = "09:00:00";

// ─────────────────────────────────────────────────────────────────────────────
// API Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiWorklogPage {
    #[serde(default)]
    metadata: ApiPageMetadata,
    #[serde(default)]
    results: Vec<ApiWorklog>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPageMetadata {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiWorklog {
    tempo_worklog_id: i64,
    issue: ApiIssueRef,
    time_spent_seconds: i64,
    #[serde(default)]
    billable_seconds: Option<i64>,
    start_date: String,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    author: Option<ApiAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiIssueRef {
    id: i64,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAuthor {
    account_id: String,
}

impl ApiWorklog {
    fn started_at(&self) -> Result<NaiveDateTime> {
        let date = NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d")?;
        let raw_time = self
            .start_time
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_START_TIME);
        let time = NaiveTime::parse_from_str(raw_time, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw_time, "%H:%M"))?;
        Ok(date.and_time(time))
    }

    fn author_account_id(&self) -> Option<&str> {
        self.author.as_ref().map(|a| a.account_id.as_str())
    }

    /// Builds the domain worklog once the issue is known.
    fn into_worklog(self, issue: Option<&JiraIssue>) -> Result<SourceWorklog> {
        let started_at = self.started_at()?;
        let container_key = issue
            .map(|i| i.key.clone())
            .or_else(|| self.issue.key.clone())
            .ok_or_else(|| ValidationError::MissingField("issue.key".to_string()))?;

        Ok(SourceWorklog {
            source_id: self.tempo_worklog_id.to_string(),
            container_key,
            container_summary: issue.and_then(|i| i.summary.clone()),
            container_type: issue.and_then(|i| i.issue_type.clone()),
            started_at,
            duration_seconds: self.time_spent_seconds,
            billable_seconds: self.billable_seconds,
            description: self.description.unwrap_or_default(),
            last_modified_at: self.updated_at.unwrap_or_default(),
            author_account_id: self.author.map(|a| a.account_id),
        })
    }
}

/// Converts raw worklogs, reporting the ones that cannot be converted as
/// unreadable instead of dropping them.
fn build_fetch(
    raw: Vec<ApiWorklog>,
    issues: &HashMap<String, JiraIssue>,
    issues_resolved: bool,
) -> WorklogFetch {
    let mut fetch = WorklogFetch::default();
    for api in raw {
        let worklog_id = api.tempo_worklog_id.to_string();
        let issue_id = api.issue.id.to_string();
        let issue = issues.get(&issue_id);
        if issues_resolved && issue.is_none() {
            warn!(
                "[Tempo] Worklog {} unreadable: issue {} could not be resolved",
                worklog_id, issue_id
            );
            fetch.unreadable.push(worklog_id);
            continue;
        }
        match api.into_worklog(issue) {
            Ok(worklog) => fetch.worklogs.push(worklog),
            Err(err) => {
                warn!("[Tempo] Worklog {} unreadable: {}", worklog_id, err);
                fetch.unreadable.push(worklog_id);
            }
        }
    }
    fetch
}

/// Reads worklogs from Tempo and resolves their issues through Jira.
#[derive(Debug, Clone)]
pub struct TempoClient {
    http: HttpClient,
    jira: Option<JiraClient>,
}

impl TempoClient {
    pub fn new(
        base_url: &str,
        api_token: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = HttpClient::new(
            "Tempo",
            base_url,
            Auth::Bearer(api_token.to_string()),
            timeout,
            retry,
        )?;
        Ok(Self { http, jira: None })
    }

    /// Issue keys, summaries and types are looked up through `jira`.
    pub fn with_jira(mut self, jira: JiraClient) -> Self {
        self.jira = Some(jira);
        self
    }

    async fn fetch_raw(&self, window: &SyncWindow) -> Result<Vec<ApiWorklog>> {
        let mut worklogs = Vec::new();
        let mut offset = 0usize;
        loop {
            let query = [
                ("from", window.start.format("%Y-%m-%d").to_string()),
                ("to", window.end.format("%Y-%m-%d").to_string()),
                ("offset", offset.to_string()),
                ("limit", PAGE_SIZE.to_string()),
            ];
            let page: ApiWorklogPage = self.http.get("/4/worklogs", &query).await?;
            let received = page.results.len();
            debug!("[Tempo] Page at offset {} returned {} worklogs", offset, received);
            worklogs.extend(page.results);

            if page.metadata.next.is_none() || received == 0 {
                break;
            }
            offset += received;
        }
        Ok(worklogs)
    }
}

#[async_trait]
impl SourceClient for TempoClient {
    async fn fetch_worklogs(
        &self,
        window: &SyncWindow,
        filter: &WorklogFilter,
    ) -> Result<WorklogFetch> {
        let mut raw = self.fetch_raw(window).await?;
        if let Some(author) = filter.author_account_id.as_deref() {
            raw.retain(|w| w.author_account_id() == Some(author));
        }

        let issues = match &self.jira {
            Some(jira) => {
                jira.resolve_issues(raw.iter().map(|w| w.issue.id.to_string()))
                    .await?
            }
            None => Default::default(),
        };

        let fetch = build_fetch(raw, &issues, self.jira.is_some());
        info!(
            "[Tempo] Fetched {} worklogs for {} ({} unreadable)",
            fetch.worklogs.len(),
            window,
            fetch.unreadable.len()
        );
        Ok(fetch)
    }
}
