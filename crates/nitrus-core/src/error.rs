//! Error types and result aliases for nitrus.
//!
//! This module defines the shared error types used across all nitrus
//! components. Errors are structured for programmatic handling and include
//! context for debugging.

use std::fmt;

/// The result type used throughout nitrus.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nitrus operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A database operation failed.
    #[error("database error: {message}")]
    Database {
        /// Description of the database failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A path or object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A mutation was requested from an adapter that does not support it.
    #[error("adapter {adapter} does not support mutations")]
    MutationUnsupported {
        /// Name of the adapter that lacks the capability.
        adapter: String,
    },

    /// Waiting on a cross-load signal exceeded the safety timeout.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new database error with the given message.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new database error with a source cause.
    #[must_use]
    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Error returned by plan application, carrying how far execution got.
///
/// Apply aborts the remaining actions of the failing kind-group; actions
/// executed before the failure are not rolled back, so callers need the
/// count to report partial progress.
#[derive(Debug, thiserror::Error)]
#[error("apply aborted after {executed} action(s): {source}")]
pub struct ApplyError {
    /// Number of actions that executed successfully before the failure.
    pub executed: usize,
    /// The error that aborted the run.
    #[source]
    pub source: Error,
}
