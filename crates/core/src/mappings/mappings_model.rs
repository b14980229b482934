use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The source fields last pushed to the destination.
///
/// `description` is always the canonical description, never the raw comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub duration_seconds: i64,
    pub description: String,
    pub work_date: NaiveDate,
}

/// Durable link between a source worklog and its destination entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMapping {
    pub source_id: String,
    /// `None` until a create call has succeeded.
    pub destination_id: Option<String>,
    pub container_key: String,
    pub last_duration_seconds: Option<i64>,
    pub last_description: Option<String>,
    pub last_work_date: Option<NaiveDate>,
    pub source_updated_at: Option<String>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub needs_update: bool,
    pub processed: bool,
    /// Reconstructed from a correlation marker rather than a create result.
    pub recovered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityMapping {
    /// The stored fingerprint, or `None` when any of its fields is missing.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        Some(Fingerprint {
            duration_seconds: self.last_duration_seconds?,
            description: self.last_description.clone()?,
            work_date: self.last_work_date?,
        })
    }

    /// True when the stored fingerprint is incomplete or differs from `current`.
    pub fn fingerprint_differs(&self, current: &Fingerprint) -> bool {
        match self.fingerprint() {
            Some(stored) => stored != *current,
            None => true,
        }
    }

    pub fn verification_expired(&self, staleness_hours: i64, now: DateTime<Utc>) -> bool {
        match self.last_verified_at {
            Some(verified_at) => now - verified_at > Duration::hours(staleness_hours),
            None => true,
        }
    }
}

/// Input for an upsert into the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingUpsert {
    pub source_id: String,
    pub destination_id: Option<String>,
    pub container_key: String,
    pub fingerprint: Option<Fingerprint>,
    pub source_updated_at: Option<String>,
    pub needs_update: bool,
    pub recovered: bool,
}

impl MappingUpsert {
    /// A mapping for a worklog that has not been created in the destination yet.
    pub fn pending(
        source_id: impl Into<String>,
        container_key: impl Into<String>,
        fingerprint: Fingerprint,
        source_updated_at: Option<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: None,
            container_key: container_key.into(),
            fingerprint: Some(fingerprint),
            source_updated_at,
            needs_update: true,
            recovered: false,
        }
    }

    /// A mapping confirmed by a successful create or update.
    pub fn synced(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        container_key: impl Into<String>,
        fingerprint: Fingerprint,
        source_updated_at: Option<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: Some(destination_id.into()),
            container_key: container_key.into(),
            fingerprint: Some(fingerprint),
            source_updated_at,
            needs_update: false,
            recovered: false,
        }
    }

    /// A mapping rebuilt from a destination entry's correlation marker.
    ///
    /// No fingerprint is known, so the next change check reports a change
    /// and the entry is rewritten with current source values.
    pub fn recovered(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        container_key: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: Some(destination_id.into()),
            container_key: container_key.into(),
            fingerprint: None,
            source_updated_at: None,
            needs_update: false,
            recovered: true,
        }
    }
}
