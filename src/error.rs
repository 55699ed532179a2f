//! Error types for the metrics core.

use std::error::Error as StdError;
use std::fmt;
use std::result;
use tonic::Status;

/// A specialized Result type for metrics core operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for metrics core operations.
#[derive(Debug)]
pub enum Error {
    /// Unregistered metric name, model or column mapping
    NotFound(String),
    /// Combine attempted across two different metric kinds
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// Malformed histogram scalar or missing column in a stored row
    Decode(String),
    /// Failure reported by the storage client
    BackendIo(String),
    /// Conflicting or late registration
    Registration(String),
    /// Time bucket does not have a minute, hour or day width
    InvalidTimeBucket(i64),
    /// Accumulators cannot produce a display value
    InvalidState(String),
    /// Configuration errors
    Config(String),
    /// I/O errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: cannot combine {} with {}", expected, found)
            }
            Error::Decode(msg) => write!(f, "Decode error: {}", msg),
            Error::BackendIo(msg) => write!(f, "Storage backend error: {}", msg),
            Error::Registration(msg) => write!(f, "Registration error: {}", msg),
            Error::InvalidTimeBucket(bucket) => write!(f, "Invalid time bucket: {}", bucket),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::BackendIo(format!("DuckDB error: {}", err))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(msg) => Status::not_found(msg),
            err @ Error::TypeMismatch { .. } => Status::internal(err.to_string()),
            Error::Decode(msg) => Status::data_loss(format!("Decode error: {}", msg)),
            Error::BackendIo(msg) => Status::unavailable(format!("Storage backend error: {}", msg)),
            Error::Registration(msg) => Status::failed_precondition(msg),
            Error::InvalidTimeBucket(bucket) => {
                Status::invalid_argument(format!("Invalid time bucket: {}", bucket))
            }
            Error::InvalidState(msg) => Status::internal(format!("Invalid state: {}", msg)),
            Error::Config(msg) => Status::failed_precondition(format!("Config error: {}", msg)),
            Error::Io(err) => Status::internal(format!("I/O error: {}", err)),
            Error::Serialization(msg) => Status::internal(format!("Serialization error: {}", msg)),
        }
    }
}
