//! Core error types for timesync.
//!
//! This module defines storage- and transport-agnostic error types. Diesel
//! errors are converted by the storage layer, HTTP errors by the connect layer.

use chrono::{NaiveDate, ParseError as ChronoParseError};
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Remote API call failed: {0}")]
    Api(#[from] ApiError),

    /// A snapshot could not be retrieved. Fatal for the run.
    #[error("Failed to fetch {what}: {source}")]
    Fetch { what: String, source: Box<Error> },

    #[error("Routing failed: {0}")]
    Routing(#[from] RoutingError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to load configuration: {0}")]
    ConfigIO(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Missing configuration key: {0}")]
    MissingConfigKey(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Wraps an error raised while fetching one of the run's snapshots.
    pub fn fetch(what: impl Into<String>, source: Error) -> Self {
        Error::Fetch {
            what: what.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the same call later has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Api(api) => api.is_transient(),
            Error::Fetch { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Database-agnostic error type for storage operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A persisted row could not be decoded into its domain type.
    #[error("Corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Errors raised by the HTTP collaborators (Tempo, Jira, Solidtime).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{service} request timed out: {message}")]
    Timeout { service: String, message: String },

    #[error("{service} connection failed: {message}")]
    Connection { service: String, message: String },

    #[error("{service} responded with HTTP {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{service} returned an unreadable body: {message}")]
    Decode { service: String, message: String },

    #[error("{service} request could not be built: {message}")]
    InvalidRequest { service: String, message: String },
}

impl ApiError {
    /// Timeouts, dropped connections, throttling and gateway errors are
    /// retried with backoff. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout { .. } | ApiError::Connection { .. } => true,
            ApiError::Status { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            ApiError::Decode { .. } | ApiError::InvalidRequest { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }

    pub fn service(&self) -> &str {
        match self {
            ApiError::Timeout { service, .. }
            | ApiError::Connection { service, .. }
            | ApiError::Status { service, .. }
            | ApiError::Decode { service, .. }
            | ApiError::InvalidRequest { service, .. } => service,
        }
    }
}

/// Errors resolving a worklog to a destination project/task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("No destination project named '{project_name}' for {container_key}")]
    ProjectNotFound {
        project_name: String,
        container_key: String,
    },

    #[error("Worklog {0} has no container key")]
    MissingContainerKey(String),
}

/// Validation errors for input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),

    #[error("Sync window start {start} is after end {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::ConfigIO(err.to_string())
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
