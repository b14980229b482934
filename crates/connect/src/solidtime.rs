//! Solidtime time-entry destination.
//!
//! The organization membership and bulk-create support are negotiated in
//! [`SolidtimeClient::connect`] and cached for the lifetime of the client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use log::{debug, info, warn};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use timesync_core::entries::{
    DeleteOutcome, DestinationClient, DestinationEntry, DestinationProject, DestinationTask,
    NewTimeEntry, TimeEntryUpdate, UpdateOutcome,
};
use timesync_core::errors::{ApiError, Error, Result};
use timesync_core::sync::SyncWindow;

use crate::http::{Auth, HttpClient, RetryPolicy};

const API_PREFIX: &str = "/api/v1";

const ENTRY_PAGE_SIZE: usize = 500;

/// Timestamp format the time-entry endpoints accept.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ─────────────────────────────────────────────────────────────────────────────
// API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiData<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ApiPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    meta: Option<ApiPageMeta>,
}

#[derive(Debug, Deserialize)]
struct ApiPageMeta {
    current_page: u32,
    last_page: u32,
}

#[derive(Debug, Deserialize)]
struct ApiMembership {
    id: String,
    organization: ApiOrganization,
}

#[derive(Debug, Deserialize)]
struct ApiOrganization {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiProject {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTask {
    id: String,
    name: String,
    project_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiTimeEntry {
    id: String,
    start: DateTime<Utc>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    billable: bool,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
}

impl From<ApiTimeEntry> for DestinationEntry {
    fn from(entry: ApiTimeEntry) -> Self {
        let duration_seconds = entry
            .duration
            .or_else(|| entry.end.map(|end| (end - entry.start).num_seconds()))
            .unwrap_or(0);
        Self {
            destination_id: entry.id,
            start: entry.start,
            end: entry.end,
            duration_seconds,
            description: entry.description.unwrap_or_default(),
            billable: entry.billable,
            project_id: entry.project_id,
            task_id: entry.task_id,
        }
    }
}

/// One positional result of a bulk create.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiBulkItem {
    Created(ApiTimeEntry),
    Failed {
        #[serde(alias = "error")]
        message: String,
    },
}

#[derive(Debug, Serialize)]
struct ApiCreateEntry<'a> {
    member_id: &'a str,
    project_id: &'a str,
    task_id: Option<&'a str>,
    start: String,
    end: String,
    billable: bool,
    description: &'a str,
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ApiUpdateEntry<'a> {
    member_id: &'a str,
    start: String,
    end: String,
    billable: bool,
    description: &'a str,
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Range of the destination fetch for a window.
///
/// Entries are stored in UTC while the window is expressed in the source's
/// local dates, so the range is widened by a day on each side (two at the end
/// to cover the whole last day).
fn fetch_range(window: &SyncWindow) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = |date: NaiveDate| Utc.from_utc_datetime(&date.and_time(NaiveTime::default()));
    (
        midnight(window.start - ChronoDuration::days(1)),
        midnight(window.end + ChronoDuration::days(2)),
    )
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let root = trimmed.strip_suffix(API_PREFIX).unwrap_or(trimmed);
    format!("{}{}", root, API_PREFIX)
}

/// Interprets the status of the bulk-create check.
fn bulk_supported_from_check(result: &Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(Error::Api(ApiError::Status { status, .. })) => *status == 422,
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
pub struct SolidtimeClient {
    http: HttpClient,
    organization_id: String,
    member_id: String,
    bulk_supported: bool,
}

impl SolidtimeClient {
    /// Connects to an organization, resolving the caller's membership and
    /// probing optional endpoints.
    ///
    /// # Errors
    ///
    /// Fails if the memberships cannot be listed or the token's user is not a
    /// member of `organization_id`.
    pub async fn connect(
        base_url: &str,
        api_token: &str,
        organization_id: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = HttpClient::new(
            "Solidtime",
            &normalize_base_url(base_url),
            Auth::Bearer(api_token.to_string()),
            timeout,
            retry,
        )?;

        let memberships: ApiData<Vec<ApiMembership>> =
            http.get("/users/me/memberships", &[]).await?;
        let member_id = memberships
            .data
            .into_iter()
            .find(|m| m.organization.id == organization_id)
            .map(|m| m.id)
            .ok_or_else(|| {
                Error::InvalidConfigValue(format!(
                    "API token user is not a member of organization {}",
                    organization_id
                ))
            })?;

        let mut client = Self {
            http,
            organization_id: organization_id.to_string(),
            member_id,
            bulk_supported: false,
        };
        client.bulk_supported = client.check_bulk_support().await;
        info!(
            "[Solidtime] Connected to organization {} as member {} (bulk create: {})",
            client.organization_id, client.member_id, client.bulk_supported
        );
        Ok(client)
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    fn org_path(&self, suffix: &str) -> String {
        format!("/organizations/{}{}", self.organization_id, suffix)
    }

    fn entry_path(&self, destination_id: &str) -> String {
        self.org_path(&format!(
            "/time-entries/{}",
            urlencoding::encode(destination_id)
        ))
    }

    async fn check_bulk_support(&self) -> bool {
        let empty: Vec<ApiCreateEntry<'_>> = Vec::new();
        let result = self
            .http
            .send(
                Method::POST,
                &self.org_path("/time-entries/bulk"),
                &[],
                Some(&empty),
            )
            .await
            .map(|_| ());
        if let Err(err) = &result {
            debug!("[Solidtime] Bulk create check: {}", err);
        }
        bulk_supported_from_check(&result)
    }

    /// Collects every page of a page-numbered listing.
    async fn get_all_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let response: ApiPage<T> = self.http.get(path, &[("page", page.to_string())]).await?;
            items.extend(response.data);
            match response.meta {
                Some(meta) if meta.current_page < meta.last_page => page += 1,
                _ => break,
            }
        }
        Ok(items)
    }

    fn create_payload<'a>(&'a self, entry: &'a NewTimeEntry) -> ApiCreateEntry<'a> {
        ApiCreateEntry {
            member_id: &self.member_id,
            project_id: &entry.project_id,
            task_id: entry.task_id.as_deref(),
            start: format_timestamp(entry.start),
            end: format_timestamp(entry.end()),
            billable: entry.billable,
            description: &entry.description,
            tags: Vec::new(),
        }
    }
}

#[async_trait]
impl DestinationClient for SolidtimeClient {
    async fn fetch_entries(&self, window: &SyncWindow) -> Result<Vec<DestinationEntry>> {
        let (start, end) = fetch_range(window);
        let path = self.org_path("/time-entries");
        let mut entries = Vec::new();
        let mut offset = 0usize;
        loop {
            let query = [
                ("member_id", self.member_id.clone()),
                ("start", format_timestamp(start)),
                ("end", format_timestamp(end)),
                ("limit", ENTRY_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            let page: ApiData<Vec<ApiTimeEntry>> = self.http.get(&path, &query).await?;
            let received = page.data.len();
            entries.extend(page.data.into_iter().map(DestinationEntry::from));
            if received < ENTRY_PAGE_SIZE {
                break;
            }
            offset += received;
        }
        info!("[Solidtime] Fetched {} time entries for {}", entries.len(), window);
        Ok(entries)
    }

    async fn create_entry(&self, entry: &NewTimeEntry) -> Result<String> {
        let created: ApiData<ApiTimeEntry> = self
            .http
            .post(&self.org_path("/time-entries"), &self.create_payload(entry))
            .await?;
        Ok(created.data.id)
    }

    fn supports_bulk_create(&self) -> bool {
        self.bulk_supported
    }

    async fn create_entries(&self, entries: &[NewTimeEntry]) -> Result<Vec<Result<String>>> {
        if !self.bulk_supported {
            let mut results = Vec::with_capacity(entries.len());
            for entry in entries {
                results.push(self.create_entry(entry).await);
            }
            return Ok(results);
        }

        let payload: Vec<ApiCreateEntry<'_>> =
            entries.iter().map(|e| self.create_payload(e)).collect();
        let response: ApiData<Vec<ApiBulkItem>> = self
            .http
            .post(&self.org_path("/time-entries/bulk"), &payload)
            .await?;

        let mut items = response.data.into_iter();
        Ok((0..entries.len())
            .map(|index| match items.next() {
                Some(ApiBulkItem::Created(entry)) => Ok(entry.id),
                Some(ApiBulkItem::Failed { message }) => Err(Error::Api(ApiError::Status {
                    service: "Solidtime".to_string(),
                    status: 422,
                    message,
                })),
                None => Err(Error::Api(ApiError::Decode {
                    service: "Solidtime".to_string(),
                    message: format!("bulk response has no result for item {}", index),
                })),
            })
            .collect())
    }

    async fn update_entry(
        &self,
        destination_id: &str,
        update: &TimeEntryUpdate,
    ) -> Result<UpdateOutcome> {
        let payload = ApiUpdateEntry {
            member_id: &self.member_id,
            start: format_timestamp(update.start),
            end: format_timestamp(update.end()),
            billable: update.billable,
            description: &update.description,
        };
        match self
            .http
            .send(Method::PUT, &self.entry_path(destination_id), &[], Some(&payload))
            .await
        {
            Ok(_) => Ok(UpdateOutcome::Updated),
            Err(Error::Api(err)) if err.is_not_found() => Ok(UpdateOutcome::NotFound),
            Err(err) => Err(err),
        }
    }

    async fn delete_entry(&self, destination_id: &str) -> Result<DeleteOutcome> {
        match self.http.delete(&self.entry_path(destination_id)).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(Error::Api(err)) if err.is_not_found() => {
                warn!("[Solidtime] Time entry {} already gone", destination_id);
                Ok(DeleteOutcome::NotFound)
            }
            Err(err) => Err(err),
        }
    }

    async fn list_projects(&self) -> Result<Vec<DestinationProject>> {
        let projects: Vec<ApiProject> = self.get_all_pages(&self.org_path("/projects")).await?;
        Ok(projects
            .into_iter()
            .map(|p| DestinationProject {
                id: p.id,
                name: p.name,
            })
            .collect())
    }

    async fn list_tasks(&self) -> Result<Vec<DestinationTask>> {
        let tasks: Vec<ApiTask> = self.get_all_pages(&self.org_path("/tasks")).await?;
        Ok(tasks
            .into_iter()
            .map(|t| DestinationTask {
                id: t.id,
                name: t.name,
                project_id: t.project_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://app.solidtime.io/"),
            "https://app.solidtime.io/api/v1"
        );
        assert_eq!(
            normalize_base_url("https://time.example.com/api/v1/"),
            "https://time.example.com/api/v1"
        );
    }

    #[test]
    fn test_fetch_range_pads_window() {
        let window = SyncWindow::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        )
        .unwrap();
        let (start, end) = fetch_range(&window);
        assert_eq!(format_timestamp(start), "2024-12-31T00:00:00Z");
        assert_eq!(format_timestamp(end), "2025-02-02T00:00:00Z");
    }

    #[test]
    fn test_parse_entry_page() {
        let body = r#"{"data": [
            {"id": "d1", "start": "2025-01-06T14:30:00Z", "end": "2025-01-06T15:00:00Z",
             "duration": 1800, "description": "AS-12: Fix [correlation:610]",
             "billable": true, "project_id": "p-as", "task_id": null, "tags": []},
            {"id": "d2", "start": "2025-01-07T09:00:00Z", "end": "2025-01-07T09:10:00Z",
             "duration": null, "description": null, "billable": false, "project_id": null}
        ]}"#;
        let page: ApiData<Vec<ApiTimeEntry>> = serde_json::from_str(body).unwrap();
        let entries: Vec<DestinationEntry> = page.data.into_iter().map(Into::into).collect();

        assert_eq!(entries[0].destination_id, "d1");
        assert_eq!(entries[0].duration_seconds, 1800);
        assert_eq!(entries[0].project_id.as_deref(), Some("p-as"));
        assert_eq!(entries[1].duration_seconds, 600);
        assert_eq!(entries[1].description, "");
    }

    #[test]
    fn test_create_payload_shape() {
        let entry = NewTimeEntry {
            project_id: "p-as".to_string(),
            task_id: Some("t-general".to_string()),
            start: Utc.with_ymd_and_hms(2025, 1, 6, 14, 30, 0).unwrap(),
            duration_seconds: 1800,
            description: "AS-12: Fix [correlation:610]".to_string(),
            billable: true,
        };
        let payload = ApiCreateEntry {
            member_id: "m-1",
            project_id: &entry.project_id,
            task_id: entry.task_id.as_deref(),
            start: format_timestamp(entry.start),
            end: format_timestamp(entry.end()),
            billable: entry.billable,
            description: &entry.description,
            tags: Vec::new(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["member_id"], "m-1");
        assert_eq!(json["start"], "2025-01-06T14:30:00Z");
        assert_eq!(json["end"], "2025-01-06T15:00:00Z");
        assert_eq!(json["task_id"], "t-general");
    }

    #[test]
    fn test_parse_bulk_items() {
        let body = r#"{"data": [
            {"id": "new-1", "start": "2025-01-06T14:30:00Z", "billable": true},
            {"message": "The project does not exist."}
        ]}"#;
        let response: ApiData<Vec<ApiBulkItem>> = serde_json::from_str(body).unwrap();
        assert!(matches!(&response.data[0], ApiBulkItem::Created(e) if e.id == "new-1"));
        assert!(matches!(&response.data[1], ApiBulkItem::Failed { message } if message.contains("project")));
    }

    #[test]
    fn test_bulk_check_interpretation() {
        let status = |code| {
            Err(Error::Api(ApiError::Status {
                service: "Solidtime".to_string(),
                status: code,
                message: String::new(),
            }))
        };
        assert!(bulk_supported_from_check(&Ok(())));
        assert!(bulk_supported_from_check(&status(422)));
        assert!(!bulk_supported_from_check(&status(404)));
        assert!(!bulk_supported_from_check(&status(405)));
    }

    #[test]
    fn test_paged_listing_meta() {
        let body = r#"{"data": [{"id": "p1", "name": "AS"}], "meta": {"current_page": 1, "last_page": 3}}"#;
        let page: ApiPage<ApiProject> = serde_json::from_str(body).unwrap();
        let meta = page.meta.unwrap();
        assert!(meta.current_page < meta.last_page);
        assert_eq!(page.data[0].name, "AS");
    }
}
