//! SQLite storage for timesync.
//!
//! Implements the identity store and run history traits of `timesync-core`
//! with Diesel on SQLite:
//! - connection pooling and the single writer actor
//! - embedded migrations
//! - repository implementations and their Diesel models
//!
//! ```text
//! core (engine)          connect (HTTP clients)
//!       │
//!       ▼
//! storage-sqlite (this crate)
//!       │
//!       ▼
//!   SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod history;
pub mod mappings;
pub mod schema;

pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};
pub use errors::{IntoCore, StorageError};
pub use history::SyncHistoryRepository;
pub use mappings::IdentityMappingRepository;

pub use timesync_core::errors::{DatabaseError, Error, Result};
