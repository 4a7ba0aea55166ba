//! Core error types for nextup-core.
//!
//! This module defines the error hierarchy using thiserror. Hierarchy and
//! rule errors are raised before any state is touched, so a returned error
//! always means "nothing changed".

use std::path::PathBuf;
use thiserror::Error;

use crate::task::TaskId;

/// Core error type for nextup-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// An operation referenced a task that does not exist.
    #[error("Unknown task id: {0}")]
    UnknownId(TaskId),

    /// Moving `task` under `parent` would close a loop in its chain.
    #[error("Cannot attach task {task} under {parent}: {parent} belongs to the same chain")]
    CycleRejected { task: TaskId, parent: TaskId },

    /// The closure table was found inconsistent. This is a bug, not a user error.
    #[error("Hierarchy invariant violated: {0}")]
    InvariantViolation(String),

    /// Recurrence rule rejected at creation time
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(#[from] RuleError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a recurrence rule is malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("step must be positive, got {0}")]
    NonPositiveStep(i32),

    #[error("ordinal must be within 1..=6, got {0}")]
    OrdinalOutOfRange(i32),

    /// The ordinal does not describe the week the start date falls in.
    #[error("ordinal {ordinal} does not match start date {start} (week {expected} of its month)")]
    OrdinalMismatch {
        ordinal: i32,
        start: chrono::NaiveDate,
        expected: i32,
    },

    /// Month-end anchoring requested for a date outside the last week of its month.
    #[error("start date {0} is not in the last week of its month")]
    NotMonthEnd(chrono::NaiveDate),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// The data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required text field was blank
    #[error("'{0}' must not be empty")]
    Empty(&'static str),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
