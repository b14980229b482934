//! Jira issue lookup used to enrich Tempo worklogs.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use serde::Deserialize;

use timesync_core::errors::{Error, Result};

use crate::http::{Auth, HttpClient, RetryPolicy};

/// Concurrent issue lookups per fetch.
const MAX_CONCURRENT_LOOKUPS: usize = 4;

/// The issue fields the sync needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraIssue {
    pub key: String,
    pub summary: Option<String>,
    pub issue_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    key: String,
    #[serde(default)]
    fields: ApiIssueFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiIssueFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    issuetype: Option<ApiIssueType>,
}

#[derive(Debug, Deserialize)]
struct ApiIssueType {
    name: String,
}

impl From<ApiIssue> for JiraIssue {
    fn from(issue: ApiIssue) -> Self {
        Self {
            key: issue.key,
            summary: issue
                .fields
                .summary
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            issue_type: issue.fields.issuetype.map(|t| t.name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    http: HttpClient,
}

impl JiraClient {
    pub fn new(
        base_url: &str,
        user_email: &str,
        api_token: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = HttpClient::new(
            "Jira",
            base_url,
            Auth::Basic {
                user: user_email.to_string(),
                password: api_token.to_string(),
            },
            timeout,
            retry,
        )?;
        Ok(Self { http })
    }

    /// Looks up one issue. `Ok(None)` when Jira does not know the id or the
    /// credentials cannot see it.
    pub async fn get_issue(&self, issue_id: &str) -> Result<Option<JiraIssue>> {
        let path = format!("/rest/api/3/issue/{}", urlencoding::encode(issue_id));
        let query = [("fields", "summary,issuetype".to_string())];
        match self.http.get::<ApiIssue>(&path, &query).await {
            Ok(issue) => Ok(Some(issue.into())),
            Err(Error::Api(err)) if err.is_not_found() => {
                warn!("[Jira] Issue {} not found", issue_id);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Resolves a set of issue ids, each at most once. Unknown ids are absent
    /// from the result; any other failure fails the whole lookup.
    pub async fn resolve_issues<I>(&self, issue_ids: I) -> Result<HashMap<String, JiraIssue>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut unique: Vec<String> = issue_ids.into_iter().collect();
        unique.sort();
        unique.dedup();
        debug!("[Jira] Resolving {} issues", unique.len());

        let lookups: Vec<(String, Result<Option<JiraIssue>>)> = stream::iter(unique)
            .map(|id| async move {
                let issue = self.get_issue(&id).await;
                (id, issue)
            })
            .buffer_unordered(MAX_CONCURRENT_LOOKUPS)
            .collect()
            .await;

        let mut issues = HashMap::with_capacity(lookups.len());
        for (id, lookup) in lookups {
            if let Some(issue) = lookup? {
                issues.insert(id, issue);
            }
        }
        Ok(issues)
    }
}
