//! timesync core - domain types, traits and the reconciliation engine.
//!
//! This crate is storage- and transport-agnostic. The identity store is
//! implemented by `storage-sqlite`, the source and destination clients by
//! `connect`.

pub mod constants;
pub mod entries;
pub mod errors;
pub mod mappings;
pub mod settings;
pub mod sync;
pub mod worklogs;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
