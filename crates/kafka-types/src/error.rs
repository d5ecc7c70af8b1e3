//! Error types for kafka-types crate.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while decoding a record's key or value.
///
/// Decode errors never abort a run; the consumption loop turns them into
/// diagnostic records.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Avro decode error: {0}")]
    Avro(String),

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Schema registry error: {0}")]
    Registry(String),

    #[error("Message has no value")]
    MissingValue,

    #[error("Decoded value is not an object: {0}")]
    NotAnObject(String),
}

/// Result type alias for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// How the consumption loop must react to a broker-reported record error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Transient; log and skip the record.
    Retriable,
    /// Not transient, but not fatal either; log and skip the record.
    NonFatal,
    /// Abort the run.
    Fatal,
}

/// An error the broker reported in place of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// Broker error code name (e.g. `BrokerTransportFailure`)
    pub code: String,
    /// Human readable description
    pub message: String,
    pub retriable: bool,
    pub fatal: bool,
}

impl RecordError {
    pub fn retriable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retriable: true,
            fatal: false,
        }
    }

    pub fn non_fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retriable: false,
            fatal: false,
        }
    }

    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retriable: false,
            fatal: true,
        }
    }

    /// A retriable error is never treated as fatal, even when the broker
    /// sets both flags.
    pub fn severity(&self) -> ErrorSeverity {
        if self.retriable {
            ErrorSeverity::Retriable
        } else if !self.fatal {
            ErrorSeverity::NonFatal
        } else {
            ErrorSeverity::Fatal
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RecordError {}
