//! Error types for ledgerql
//!
//! This module defines the errors raised by the store layer, the
//! placeholder resolver, the query gateway and the oracle boundary.

use std::fmt;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported store backend: {0}")]
    UnsupportedBackend(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sled::Error> for StoreError {
    fn from(error: sled::Error) -> Self {
        StoreError::Internal(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for StoreError {
    fn from(error: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;
        match error.kind.as_ref() {
            ErrorKind::ServerSelection { .. } | ErrorKind::Authentication { .. } | ErrorKind::Io(_) => {
                StoreError::Connection(error.to_string())
            }
            _ => StoreError::Internal(error.to_string()),
        }
    }
}

impl From<crate::core::path::PathError> for StoreError {
    fn from(error: crate::core::path::PathError) -> Self {
        StoreError::InvalidOperation(error.to_string())
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised while resolving symbolic date tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("Unrecognized date placeholder: {0}")]
    Unresolved(String),

    #[error("Invalid date in placeholder {0}: {1}")]
    InvalidDate(String, String),
}

/// Broad family of a gateway failure, used to prefix reported messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The oracle text could not be read as a document
    Parse,
    /// Everything after a successful parse
    Execution,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Parse => write!(f, "Parse error"),
            ErrorCategory::Execution => write!(f, "Execution error"),
        }
    }
}

/// Errors that can occur while running a structured query description
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("malformed query document: {0}")]
    MalformedOutput(String),

    #[error("invalid query description: {0}")]
    InvalidQuery(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("oracle declined the request: {0}")]
    OracleRefusal(String),

    #[error(transparent)]
    Placeholder(#[from] PlaceholderError),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// The category this failure is reported under
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::MalformedOutput(_) => ErrorCategory::Parse,
            _ => ErrorCategory::Execution,
        }
    }

    /// Human-readable message, prefixed by the failure category
    pub fn report(&self) -> String {
        format!("{}: {}", self.category(), self)
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors raised at the oracle boundary
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("oracle returned an unusable response: {0}")]
    Response(String),

    #[error("oracle is not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(error: reqwest::Error) -> Self {
        OracleError::Transport(error.to_string())
    }
}

/// Errors raised while reading configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid store URI: {0}")]
    InvalidStoreUri(String),

    #[error("Invalid placeholder policy: {0} (expected 'pass-through' or 'reject')")]
    InvalidPolicy(String),
}
