use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use log::warn;
use std::sync::Arc;

use timesync_core::errors::Result;
use timesync_core::mappings::{Fingerprint, IdentityMapping, IdentityStoreTrait, MappingUpsert};

use super::model::{IdentityMappingChangeset, IdentityMappingDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::identity_mappings;
use crate::schema::identity_mappings::dsl::*;

pub struct IdentityMappingRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl IdentityMappingRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    /// Decodes rows, skipping the ones that cannot be read.
    fn decode_all(rows: Vec<IdentityMappingDB>) -> Vec<IdentityMapping> {
        rows.into_iter().filter_map(decode).collect()
    }

    async fn touch<F>(&self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut SqliteConnection, &str, String) -> QueryResult<usize> + Send + 'static,
    {
        let id = id.to_string();
        self.writer
            .exec(move |conn| {
                apply(conn, &id, Utc::now().to_rfc3339()).map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

/// A row that fails to decode is logged and reported as absent.
fn decode(row: IdentityMappingDB) -> Option<IdentityMapping> {
    match IdentityMapping::try_from(row) {
        Ok(mapping) => Some(mapping),
        Err(e) => {
            warn!("Ignoring unreadable identity mapping: {}", e);
            None
        }
    }
}

#[async_trait]
impl IdentityStoreTrait for IdentityMappingRepository {
    fn get(&self, id: &str) -> Result<Option<IdentityMapping>> {
        let mut conn = get_connection(&self.pool)?;
        let row = identity_mappings
            .find(id)
            .select(IdentityMappingDB::as_select())
            .first::<IdentityMappingDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.and_then(decode))
    }

    fn list(&self) -> Result<Vec<IdentityMapping>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = identity_mappings
            .select(IdentityMappingDB::as_select())
            .order(source_id.asc())
            .load::<IdentityMappingDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(Self::decode_all(rows))
    }

    fn count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        Ok(identity_mappings
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?)
    }

    fn unprocessed(&self) -> Result<Vec<IdentityMapping>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = identity_mappings
            .filter(processed.eq(false))
            .select(IdentityMappingDB::as_select())
            .order(source_id.asc())
            .load::<IdentityMappingDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(Self::decode_all(rows))
    }

    async fn put(&self, mapping: MappingUpsert) -> Result<IdentityMapping> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now();
                let insert = IdentityMappingDB::from_upsert(&mapping, now);
                let changes = IdentityMappingChangeset::from_upsert(&mapping, now);

                let row = diesel::insert_into(identity_mappings::table)
                    .values(&insert)
                    .on_conflict(source_id)
                    .do_update()
                    .set(&changes)
                    .returning(IdentityMappingDB::as_returning())
                    .get_result::<IdentityMappingDB>(conn)
                    .map_err(StorageError::from)?;

                // An old corrupt created_at survives the upsert; replace it.
                match IdentityMapping::try_from(row) {
                    Ok(stored) => Ok(stored),
                    Err(e) => {
                        warn!("Rewriting unreadable mapping {}: {}", mapping.source_id, e);
                        diesel::update(identity_mappings.find(&mapping.source_id))
                            .set(created_at.eq(now.to_rfc3339()))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        let row = identity_mappings
                            .find(&mapping.source_id)
                            .select(IdentityMappingDB::as_select())
                            .first::<IdentityMappingDB>(conn)
                            .map_err(StorageError::from)?;
                        Ok(IdentityMapping::try_from(row)?)
                    }
                }
            })
            .await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.writer
            .exec(move |conn| {
                let removed = diesel::delete(identity_mappings.find(id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(removed > 0)
            })
            .await
    }

    async fn mark_for_update(&self, id: &str) -> Result<()> {
        self.touch(id, |conn, id, now| {
            diesel::update(identity_mappings.find(id))
                .set((needs_update.eq(true), updated_at.eq(now)))
                .execute(conn)
        })
        .await
    }

    async fn clear_update_flag(&self, id: &str) -> Result<()> {
        self.touch(id, |conn, id, now| {
            diesel::update(identity_mappings.find(id))
                .set((needs_update.eq(false), updated_at.eq(now)))
                .execute(conn)
        })
        .await
    }

    async fn stage_update(
        &self,
        id: &str,
        fingerprint: Fingerprint,
        updated_source_at: Option<String>,
    ) -> Result<()> {
        self.touch(id, move |conn, id, now| {
            diesel::update(identity_mappings.find(id))
                .set((
                    last_duration_seconds.eq(Some(fingerprint.duration_seconds)),
                    last_description.eq(Some(fingerprint.description)),
                    last_work_date.eq(Some(fingerprint.work_date.format("%Y-%m-%d").to_string())),
                    source_updated_at.eq(updated_source_at),
                    needs_update.eq(true),
                    updated_at.eq(now),
                ))
                .execute(conn)
        })
        .await
    }

    async fn mark_verified(&self, id: &str) -> Result<()> {
        self.touch(id, |conn, id, now| {
            diesel::update(identity_mappings.find(id))
                .set((last_verified_at.eq(Some(now.clone())), updated_at.eq(now)))
                .execute(conn)
        })
        .await
    }

    async fn reset_processed(&self) -> Result<usize> {
        self.writer
            .exec(|conn| {
                Ok(diesel::update(identity_mappings)
                    .set(processed.eq(false))
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await
    }

    async fn mark_processed(&self, id: &str) -> Result<()> {
        self.touch(id, |conn, id, _now| {
            diesel::update(identity_mappings.find(id))
                .set(processed.eq(true))
                .execute(conn)
        })
        .await
    }
}
