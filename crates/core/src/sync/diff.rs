//! Change and drift detection.
//!
//! `source_fingerprint` feeds the store-side change check
//! ([`IdentityMapping::fingerprint_differs`](crate::mappings::IdentityMapping::fingerprint_differs)).
//! `differs_from_source` compares a live destination entry with the source.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::entries::DestinationEntry;
use crate::mappings::Fingerprint;
use crate::settings::DriftTolerance;
use crate::sync::description::canonical_description;
use crate::worklogs::SourceWorklog;

pub fn source_fingerprint(worklog: &SourceWorklog) -> Fingerprint {
    Fingerprint {
        duration_seconds: worklog.duration_seconds,
        description: canonical_description(worklog),
        work_date: worklog.work_date(),
    }
}

/// The worklog's start as a UTC instant.
///
/// Ambiguous local times take the earlier instant. Times inside a DST gap
/// are moved forward by one hour.
pub fn source_start_utc(worklog: &SourceWorklog, tz: Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&worklog.started_at)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(worklog.started_at + Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&worklog.started_at))
}

/// First field found to diverge between a destination entry and its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftReason {
    Duration { expected: i64, actual: i64 },
    Date { expected: NaiveDate, actual: NaiveDate },
    StartTime { expected: NaiveTime, actual: NaiveTime },
    Description { expected: String, actual: String },
}

impl std::fmt::Display for DriftReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftReason::Duration { expected, actual } => {
                write!(f, "duration {}s, expected {}s", actual, expected)
            }
            DriftReason::Date { expected, actual } => {
                write!(f, "date {}, expected {}", actual, expected)
            }
            DriftReason::StartTime { expected, actual } => {
                write!(f, "start {}, expected {}", actual, expected)
            }
            DriftReason::Description { .. } => write!(f, "description changed"),
        }
    }
}

/// Compares a live destination entry with what the source says.
///
/// Dates and times of day are compared in the source time zone.
pub fn differs_from_source(
    entry: &DestinationEntry,
    worklog: &SourceWorklog,
    tolerance: &DriftTolerance,
    tz: Tz,
) -> Option<DriftReason> {
    if (entry.duration_seconds - worklog.duration_seconds).abs() > tolerance.duration_seconds {
        return Some(DriftReason::Duration {
            expected: worklog.duration_seconds,
            actual: entry.duration_seconds,
        });
    }

    let local_start = entry.start.with_timezone(&tz);
    let expected_date = worklog.work_date();
    let actual_date = local_start.date_naive();
    if actual_date != expected_date {
        return Some(DriftReason::Date {
            expected: expected_date,
            actual: actual_date,
        });
    }

    let expected_time = worklog.started_at.time();
    let actual_time = local_start.time();
    if actual_time
        .signed_duration_since(expected_time)
        .num_seconds()
        .abs()
        > tolerance.start_time_seconds
    {
        return Some(DriftReason::StartTime {
            expected: expected_time,
            actual: actual_time,
        });
    }

    let expected_description = canonical_description(worklog);
    if entry.description != expected_description {
        return Some(DriftReason::Description {
            expected: expected_description,
            actual: entry.description.clone(),
        });
    }

    None
}
