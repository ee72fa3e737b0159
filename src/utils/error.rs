//! Error types for the rotation engine
//!
//! This module defines the domain-specific error types used throughout the crate.

use thiserror::Error;

/// Errors raised by the persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A single-row query matched nothing
    #[error("Row not found: {0}")]
    RowNotFound(String),

    /// A text column could not be parsed into its typed value
    #[error("Bad value for column {column}: {value:?}")]
    BadColumn { column: String, value: String },

    /// A column the caller expected was absent from the row
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Opening the database file failed
    #[error("Cannot open database: {0}")]
    Open(String),
}

/// Errors raised while building or uploading a content bundle
#[derive(Error, Debug)]
pub enum PublishError {
    /// Bundle serialization failed
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The object store could not be reached or its answer not read
    #[error("Object store request failed: {0}")]
    Transport(String),

    /// Object store answered with a non-success status
    #[error("Object store rejected {key}: HTTP {status}")]
    Rejected { key: String, status: u16 },

    /// Writing the published URL back to storage failed
    #[error("Failed to record published URL: {0}")]
    Record(#[from] StorageError),

    /// Object store client could not be configured
    #[error("Object store setup failed: {0}")]
    Setup(String),
}

/// Selection exhaustion, returned to callers of the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// A full SHOW cycle found no live domain
    #[error("no useful domain!")]
    NoUsableDomain,

    /// A full JUMP cycle found no live domain with a live SHOW target
    #[error("no useful jump domain!")]
    NoUsableJumpDomain,

    /// No content groups are tracked
    #[error("no content group!")]
    NoContentGroup,

    /// The requested content group is not tracked
    #[error("no this content group!")]
    UnknownContentGroup(i64),

    /// The rotation list names a group missing from the map
    #[error("content map error!")]
    ContentMapInconsistent(i64),
}

/// Errors raised by the geo lookup collaborator
#[derive(Error, Debug)]
pub enum GeoError {
    /// Database file could not be read
    #[error("Cannot read geo database: {0}")]
    Io(#[from] std::io::Error),

    /// A binary geo database could not be opened or read
    #[error("Geo database error: {0}")]
    Database(String),

    /// A database line was malformed
    #[error("Malformed geo database line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// The address was not a valid IP
    #[error("Invalid IP address: {0:?}")]
    InvalidAddress(String),

    /// The address is not covered by any range
    #[error("No location for {0}")]
    NotFound(String),
}
