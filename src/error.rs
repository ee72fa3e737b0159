//! Unified error handling for the rotor crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain errors usable on their own.
//!
//! # Architecture
//!
//! - [`RotorErrorTrait`] - Common interface implemented by the unified error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Background tasks never propagate their errors: the watchers and the
//! catch-up task log at `warn` when [`RotorErrorTrait::is_recoverable`] says
//! the next cycle may succeed and at `error` otherwise, and publish failures
//! are counted under their [`ErrorCategory`] label.

use std::io;
use thiserror::Error;

pub use crate::utils::error::{GeoError, PublishError, SelectionError, StorageError};

/// Common trait for rotor error types
pub trait RotorErrorTrait: std::error::Error {
    /// Whether the next natural cycle may succeed where this one failed
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Probe or object store transport errors
    Network,
    /// Persistence errors
    Storage,
    /// Bundle building and upload errors
    Publish,
    /// Selection exhaustion
    Selection,
    /// Geo lookup errors
    Geo,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short lowercase label, used as a metrics label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Publish => "publish",
            Self::Selection => "selection",
            Self::Geo => "geo",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the rotor crate
#[derive(Error, Debug)]
pub enum Error {
    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Publish pipeline errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Selection exhaustion
    #[error("{0}")]
    Selection(#[from] SelectionError),

    /// Geo lookup errors
    #[error("Geo error: {0}")]
    Geo(#[from] GeoError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RotorErrorTrait for StorageError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Open(_))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

impl RotorErrorTrait for PublishError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Setup(_) | Self::Encode(_) => false,
            Self::Record(e) => e.is_recoverable(),
            Self::Transport(_) | Self::Rejected { .. } => true,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::Rejected { .. } => ErrorCategory::Network,
            Self::Record(_) => ErrorCategory::Storage,
            Self::Encode(_) | Self::Setup(_) => ErrorCategory::Publish,
        }
    }
}

impl RotorErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_recoverable(),
            Self::Publish(e) => e.is_recoverable(),
            Self::Selection(_) => true,
            Self::Geo(GeoError::Io(_))
            | Self::Geo(GeoError::Malformed { .. })
            | Self::Geo(GeoError::Database(_)) => false,
            Self::Geo(_) => true,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Publish(e) => e.category(),
            Self::Http(_) => ErrorCategory::Network,
            Self::Json(_) => ErrorCategory::Publish,
            Self::Selection(_) => ErrorCategory::Selection,
            Self::Geo(_) => ErrorCategory::Geo,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(err))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
