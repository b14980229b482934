use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ValidationError};

/// Inclusive date range a run reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SyncWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ValidationError::InvalidWindow { start, end }.into());
        }
        Ok(Self { start, end })
    }

    /// The `days_back` days up to and including `today`.
    pub fn last_days(today: NaiveDate, days_back: i64) -> Self {
        let days_back = days_back.max(0);
        Self {
            start: today - Duration::days(days_back),
            end: today,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl std::fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
