//! Storage-specific error types for SQLite operations.
//!
//! Diesel and r2d2 errors stay inside this crate and are converted to the
//! database-agnostic errors of `timesync_core` at the repository boundary.

use diesel::result::Error as DieselError;
use thiserror::Error;
use timesync_core::errors::{DatabaseError, Error};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Corrupt row {key}: {reason}")]
    CorruptRow { key: String, reason: String },

    #[error("Writer unavailable: {0}")]
    WriterUnavailable(String),

    #[error("Core error: {0}")]
    CoreError(String),
}

/// Lets writer jobs return core errors inside a diesel transaction.
impl From<Error> for StorageError {
    fn from(err: Error) -> Self {
        StorageError::CoreError(err.to_string())
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionFailed(e) => {
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::PoolError(e) => {
                Error::Database(DatabaseError::PoolCreationFailed(e.to_string()))
            }
            StorageError::QueryFailed(DieselError::NotFound) => {
                Error::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            StorageError::QueryFailed(DieselError::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            )) => Error::Database(DatabaseError::UniqueViolation(info.message().to_string())),
            StorageError::QueryFailed(DieselError::RollbackTransaction) => Error::Database(
                DatabaseError::TransactionFailed("transaction rolled back".to_string()),
            ),
            StorageError::QueryFailed(e) => {
                Error::Database(DatabaseError::QueryFailed(e.to_string()))
            }
            StorageError::CorruptRow { key, reason } => {
                Error::Database(DatabaseError::CorruptRecord { key, reason })
            }
            StorageError::WriterUnavailable(e) => Error::Database(DatabaseError::Internal(e)),
            StorageError::CoreError(e) => Error::Database(DatabaseError::Internal(e)),
        }
    }
}

/// `.into_core()` on diesel and r2d2 results.
pub trait IntoCore<T> {
    fn into_core(self) -> timesync_core::Result<T>;
}

impl<T> IntoCore<T> for std::result::Result<T, DieselError> {
    fn into_core(self) -> timesync_core::Result<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, r2d2::Error> {
    fn into_core(self) -> timesync_core::Result<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}
