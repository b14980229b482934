use async_trait::async_trait;
use chrono::Utc;

use crate::errors::Result;
use crate::mappings::mappings_model::{Fingerprint, IdentityMapping, MappingUpsert};

/// Durable `source_id -> destination_id` store.
///
/// Reads are synchronous, writes are async and commit before returning.
/// A row that cannot be decoded is reported as absent by the read methods.
#[async_trait]
pub trait IdentityStoreTrait: Send + Sync {
    fn get(&self, source_id: &str) -> Result<Option<IdentityMapping>>;

    fn list(&self) -> Result<Vec<IdentityMapping>>;

    fn count(&self) -> Result<i64>;

    /// Mappings not marked processed in the current run.
    fn unprocessed(&self) -> Result<Vec<IdentityMapping>>;

    /// Insert or replace the mapping for `source_id`.
    ///
    /// `processed` and `created_at` of an existing row are preserved.
    /// `last_verified_at` is set to now when a destination id is given.
    async fn put(&self, mapping: MappingUpsert) -> Result<IdentityMapping>;

    /// Returns whether a row was removed.
    async fn remove(&self, source_id: &str) -> Result<bool>;

    async fn mark_for_update(&self, source_id: &str) -> Result<()>;

    async fn clear_update_flag(&self, source_id: &str) -> Result<()>;

    /// Store a new fingerprint and set `needs_update` in one commit.
    async fn stage_update(
        &self,
        source_id: &str,
        fingerprint: Fingerprint,
        source_updated_at: Option<String>,
    ) -> Result<()>;

    /// Record that the destination entry was seen just now.
    async fn mark_verified(&self, source_id: &str) -> Result<()>;

    /// Clear `processed` on every row. Returns the number of rows touched.
    async fn reset_processed(&self) -> Result<usize>;

    async fn mark_processed(&self, source_id: &str) -> Result<()>;

    fn get_destination_id(&self, source_id: &str) -> Result<Option<String>> {
        Ok(self.get(source_id)?.and_then(|m| m.destination_id))
    }

    /// True if there is no mapping, the stored fingerprint is incomplete, or
    /// any of its fields differs from `current`.
    fn has_changed(&self, source_id: &str, current: &Fingerprint) -> Result<bool> {
        Ok(match self.get(source_id)? {
            Some(mapping) => mapping.fingerprint_differs(current),
            None => true,
        })
    }

    /// True if the mapping was never verified or its verification is older
    /// than `staleness_hours`.
    fn needs_existence_check(&self, source_id: &str, staleness_hours: i64) -> Result<bool> {
        Ok(match self.get(source_id)? {
            Some(mapping) => mapping.verification_expired(staleness_hours, Utc::now()),
            None => true,
        })
    }
}
