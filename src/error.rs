//! Error types for the broker definitions tool.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration, definitions indexing, planning, broker transport and
//! deployment.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the broker definitions tool.
#[derive(Debug, Error)]
pub enum BrokerDefsError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Definitions could not be indexed.
    #[error("Definitions error: {0}")]
    Definitions(#[from] DefinitionsError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Broker management API errors.
    #[error("Broker API error: {0}")]
    Broker(#[from] BrokerError),

    /// Deployment errors.
    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file was not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A file could not be parsed.
    #[error("Failed to parse {}: {message}", .location.as_deref().unwrap_or("input"))]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Two options that cannot be combined were both set.
    #[error("Options '{first}' and '{second}' cannot be used together")]
    ConflictingOptions {
        /// First option name.
        first: String,
        /// Second option name.
        second: String,
    },
}

/// Errors raised while building an index from a definitions snapshot.
#[derive(Debug, Error)]
pub enum DefinitionsError {
    /// A record is not a JSON object.
    #[error("{kind} record #{index} is not an object")]
    NotAnObject {
        /// Resource kind of the record.
        kind: String,
        /// Position of the record in its section.
        index: usize,
    },

    /// A record lacks a field needed to compute its identity.
    #[error("{kind} record #{index} is missing identity field '{field}'")]
    MissingIdentityField {
        /// Resource kind of the record.
        kind: String,
        /// Name of the missing field.
        field: String,
        /// Position of the record in its section.
        index: usize,
    },

    /// A top-level section has the wrong shape.
    #[error("Definitions section '{section}' is not an array")]
    InvalidSection {
        /// Section name.
        section: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The broker cannot apply this operation to this resource kind.
    #[error("Unsupported operation: cannot {operation} {kind}")]
    UnsupportedOperation {
        /// Operation name.
        operation: String,
        /// Resource kind.
        kind: String,
    },

    /// A binding names a destination type the broker does not know.
    #[error("Invalid binding destination type: {value}")]
    InvalidDestinationType {
        /// The offending value.
        value: String,
    },

    /// A record lacks a field needed to build its API path.
    #[error("{kind} record is missing field '{field}'")]
    MissingField {
        /// Resource kind of the record.
        kind: String,
        /// Name of the missing field.
        field: String,
    },
}

/// Broker management API errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Authentication failed.
    #[error("Broker authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("Broker API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Resource not found.
    #[error("Resource not found: {path}")]
    NotFound {
        /// Request path.
        path: String,
    },

    /// Network error.
    #[error("Network error communicating with broker: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from broker API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Deployment errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// At least one operation in a batch failed.
    #[error("Batch '{batch}' failed: {failed} of {total} operations failed; first failure: {source}")]
    BatchFailed {
        /// Batch label.
        batch: String,
        /// Number of failed operations.
        failed: usize,
        /// Number of dispatched operations.
        total: usize,
        /// Cause of the first failure.
        source: Box<BrokerDefsError>,
    },
}

/// Result type alias for broker definitions operations.
pub type Result<T> = std::result::Result<T, BrokerDefsError>;

impl BrokerDefsError {
    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Broker(BrokerError::NetworkError { .. }) => true,
            Self::Broker(BrokerError::ApiRequestFailed { status, .. }) => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error tied to a file location.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: Some(location.into()),
        }
    }
}

impl BrokerError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}
