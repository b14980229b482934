//! Canonical destination descriptions and correlation markers.
//!
//! Every entry this system writes has the description
//! `"<container_key>: <summary-or-comment> [correlation:<source_id>]"`. The
//! same function produces it for creates, updates, fingerprints and drift
//! checks, so it is always regenerated from current source data.

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::{CORRELATION_TAG, DEFAULT_SUMMARY, PLACEHOLDER_COMMENT_PREFIX};
use crate::worklogs::SourceWorklog;

lazy_static! {
    /// `[correlation:<id>]` anywhere in a description.
    static ref CORRELATION_MARKER_REGEX: Regex =
        Regex::new(r"\[correlation:([^\]\s]+)\]").expect("Invalid regex pattern");

    /// Leading `<KEY>:` or `<KEY>-<n>:` of a description.
    static ref CONTAINER_KEY_REGEX: Regex =
        Regex::new(r"^([A-Z][A-Z0-9_]*(?:-\d+)?):").expect("Invalid regex pattern");
}

/// The human part of the description.
///
/// The worklog comment wins unless it is empty or the placeholder Tempo
/// writes for comment-less worklogs, in which case the issue summary is used.
pub fn summary_or_comment(worklog: &SourceWorklog) -> String {
    let comment = worklog.description.trim();
    let is_placeholder = comment.starts_with(PLACEHOLDER_COMMENT_PREFIX)
        && comment.contains(worklog.container_key.as_str());

    if !comment.is_empty() && !is_placeholder {
        return comment.to_string();
    }

    worklog
        .container_summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SUMMARY)
        .to_string()
}

pub fn correlation_marker(source_id: &str) -> String {
    format!("[{}:{}]", CORRELATION_TAG, source_id)
}

pub fn canonical_description(worklog: &SourceWorklog) -> String {
    format!(
        "{}: {} {}",
        worklog.container_key,
        summary_or_comment(worklog),
        correlation_marker(&worklog.source_id)
    )
}

/// Source id referenced by the description's correlation marker, if any.
pub fn parse_correlation_id(description: &str) -> Option<&str> {
    CORRELATION_MARKER_REGEX
        .captures(description)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn has_correlation_marker(description: &str) -> bool {
    CORRELATION_MARKER_REGEX.is_match(description)
}

/// Container key at the start of a description written by this system.
pub fn parse_container_key(description: &str) -> Option<&str> {
    CONTAINER_KEY_REGEX
        .captures(description.trim_start())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn worklog(key: &str, comment: &str, summary: Option<&str>) -> SourceWorklog {
        SourceWorklog {
            source_id: "610".to_string(),
            container_key: key.to_string(),
            container_summary: summary.map(str::to_string),
            container_type: None,
            started_at: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            duration_seconds: 1800,
            billable_seconds: None,
            description: comment.to_string(),
            last_modified_at: "2025-01-01T10:00:00Z".to_string(),
            author_account_id: None,
        }
    }

    #[test]
    fn test_empty_comment_without_summary_uses_default() {
        assert_eq!(
            canonical_description(&worklog("AS", "", None)),
            "AS: No description [correlation:610]"
        );
    }

    #[test]
    fn test_comment_wins_over_summary() {
        assert_eq!(
            canonical_description(&worklog("AS-1", "  Pairing on login ", Some("Login page"))),
            "AS-1: Pairing on login [correlation:610]"
        );
    }

    #[test]
    fn test_placeholder_comment_uses_summary() {
        assert_eq!(
            canonical_description(&worklog(
                "AS-1",
                "Working on issue AS-1",
                Some("Login page")
            )),
            "AS-1: Login page [correlation:610]"
        );
        // Placeholder for another issue is a real comment.
        assert_eq!(
            summary_or_comment(&worklog("AS-1", "Working on issue AS-2", Some("Login page"))),
            "Working on issue AS-2"
        );
    }

    #[test]
    fn test_parse_marker_and_key() {
        let description = "AS-1: Login page [correlation:610]";
        assert_eq!(parse_correlation_id(description), Some("610"));
        assert_eq!(parse_container_key(description), Some("AS-1"));
        assert!(has_correlation_marker(description));

        assert_eq!(parse_correlation_id("manual entry"), None);
        assert_eq!(parse_container_key("manual entry"), None);
        assert_eq!(parse_container_key("AS: x [correlation:1]"), Some("AS"));
    }
}
