/// Tag used in the correlation marker, e.g. `[correlation:610]`.
pub const CORRELATION_TAG: &str = "correlation";

/// Summary used when neither the worklog comment nor the issue summary is usable.
pub const DEFAULT_SUMMARY: &str = "No description";

/// Placeholder comment Tempo writes when the user leaves the comment empty.
pub const PLACEHOLDER_COMMENT_PREFIX: &str = "Working on issue";

/// Task name used when no per-issue-type task mapping applies.
pub const DEFAULT_TASK_NAME: &str = "General Work";

/// Maximum difference between destination and source durations before an entry counts as drifted.
pub const DEFAULT_DURATION_TOLERANCE_SECS: i64 = 60;

/// Maximum difference between destination and source start times of day.
pub const DEFAULT_START_TOLERANCE_SECS: i64 = 120;

/// Age after which a mapping's last existence confirmation is refreshed.
pub const DEFAULT_VERIFY_STALENESS_HOURS: i64 = 24;

/// Default look-back for the sync window.
pub const DEFAULT_DAYS_BACK: i64 = 30;

/// Default retention of run history rows.
pub const DEFAULT_HISTORY_RETENTION_DAYS: i64 = 90;
