//! Database models for identity mappings.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use timesync_core::mappings::{IdentityMapping, MappingUpsert};

use crate::errors::StorageError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database model for identity mappings
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::identity_mappings)]
#[diesel(primary_key(source_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IdentityMappingDB {
    pub source_id: String,
    pub destination_id: Option<String>,
    pub container_key: String,
    pub last_duration_seconds: Option<i64>,
    pub last_description: Option<String>,
    pub last_work_date: Option<String>,
    pub source_updated_at: Option<String>,
    pub last_verified_at: Option<String>,
    pub needs_update: bool,
    pub processed: bool,
    pub recovered: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Columns an upsert replaces on an existing row.
///
/// `processed` and `created_at` are left alone.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::identity_mappings)]
#[diesel(treat_none_as_null = true)]
pub struct IdentityMappingChangeset {
    pub destination_id: Option<String>,
    pub container_key: String,
    pub last_duration_seconds: Option<i64>,
    pub last_description: Option<String>,
    pub last_work_date: Option<String>,
    pub source_updated_at: Option<String>,
    pub last_verified_at: Option<String>,
    pub needs_update: bool,
    pub recovered: bool,
    pub updated_at: String,
}

impl IdentityMappingDB {
    /// Row for a fresh insert of `upsert` at `now`.
    pub fn from_upsert(upsert: &MappingUpsert, now: DateTime<Utc>) -> Self {
        let changes = IdentityMappingChangeset::from_upsert(upsert, now);
        Self {
            source_id: upsert.source_id.clone(),
            destination_id: changes.destination_id,
            container_key: changes.container_key,
            last_duration_seconds: changes.last_duration_seconds,
            last_description: changes.last_description,
            last_work_date: changes.last_work_date,
            source_updated_at: changes.source_updated_at,
            last_verified_at: changes.last_verified_at,
            needs_update: changes.needs_update,
            processed: false,
            recovered: changes.recovered,
            created_at: now.to_rfc3339(),
            updated_at: changes.updated_at,
        }
    }
}

impl IdentityMappingChangeset {
    pub fn from_upsert(upsert: &MappingUpsert, now: DateTime<Utc>) -> Self {
        let fingerprint = upsert.fingerprint.as_ref();
        Self {
            destination_id: upsert.destination_id.clone(),
            container_key: upsert.container_key.clone(),
            last_duration_seconds: fingerprint.map(|f| f.duration_seconds),
            last_description: fingerprint.map(|f| f.description.clone()),
            last_work_date: fingerprint.map(|f| f.work_date.format(DATE_FORMAT).to_string()),
            source_updated_at: upsert.source_updated_at.clone(),
            last_verified_at: upsert.destination_id.as_ref().map(|_| now.to_rfc3339()),
            needs_update: upsert.needs_update,
            recovered: upsert.recovered,
            updated_at: now.to_rfc3339(),
        }
    }
}

fn parse_timestamp(key: &str, field: &str, value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow {
            key: key.to_string(),
            reason: format!("{} '{}': {}", field, value, e),
        })
}

impl TryFrom<IdentityMappingDB> for IdentityMapping {
    type Error = StorageError;

    fn try_from(db: IdentityMappingDB) -> Result<Self, Self::Error> {
        let key = db.source_id.as_str();
        let last_work_date = db
            .last_work_date
            .as_deref()
            .map(|s| {
                NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| StorageError::CorruptRow {
                    key: key.to_string(),
                    reason: format!("last_work_date '{}': {}", s, e),
                })
            })
            .transpose()?;
        let last_verified_at = db
            .last_verified_at
            .as_deref()
            .map(|s| parse_timestamp(key, "last_verified_at", s))
            .transpose()?;
        let created_at = parse_timestamp(key, "created_at", &db.created_at)?;
        let updated_at = parse_timestamp(key, "updated_at", &db.updated_at)?;

        Ok(IdentityMapping {
            source_id: db.source_id,
            destination_id: db.destination_id,
            container_key: db.container_key,
            last_duration_seconds: db.last_duration_seconds,
            last_description: db.last_description,
            last_work_date,
            source_updated_at: db.source_updated_at,
            last_verified_at,
            needs_update: db.needs_update,
            processed: db.processed,
            recovered: db.recovered,
            created_at,
            updated_at,
        })
    }
}
