//! Unified error types for the hitcount pipeline.
//!
//! Error codes:
//! - STORE_001-002: Storage errors
//! - IMPORT_001-003: Log import errors
//! - CONFIG_001: Configuration errors

use std::sync::Arc;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: Storage operation failed (connection, timeout, I/O)
    Unavailable,
    /// STORE_002: Uniqueness conflict that could not be resolved by a lookup
    Conflict,
}

impl StoreErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "STORE_001",
            Self::Conflict => "STORE_002",
        }
    }

    /// Whether an operation failing with this code may succeed when re-run.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Import error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportErrorCode {
    /// IMPORT_001: Input file cannot be opened or read
    Unreadable,
    /// IMPORT_002: A line does not match the configured format
    MalformedLine,
    /// IMPORT_003: Export header is missing required columns
    UnsupportedExport,
}

impl ImportErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreadable => "IMPORT_001",
            Self::MalformedLine => "IMPORT_002",
            Self::UnsupportedExport => "IMPORT_003",
        }
    }
}

/// Unified error type for the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error with code.
    #[error("[{code}] {message}")]
    Store {
        code: &'static str,
        message: String,
        transient: bool,
    },

    /// Import error with code.
    #[error("[{code}] {message}")]
    Import { code: &'static str, message: String },

    #[error("[CONFIG_001] {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error.
    pub fn store(code: StoreErrorCode, msg: impl Into<String>) -> Self {
        Self::Store {
            code: code.code(),
            message: msg.into(),
            transient: code.is_transient(),
        }
    }

    /// Create an import error.
    pub fn import(code: ImportErrorCode, msg: impl Into<String>) -> Self {
        Self::Import {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Store { code, .. } => Some(code),
            Self::Import { code, .. } => Some(code),
            Self::Config(_) => Some("CONFIG_001"),
            _ => None,
        }
    }

    /// Whether the failed operation is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store { transient, .. } => *transient,
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// Whether this is a malformed input line (recoverable by skipping it).
    pub fn is_malformed_line(&self) -> bool {
        matches!(self, Self::Import { code, .. } if *code == ImportErrorCode::MalformedLine.code())
    }
}

/// Errors shared between concurrent cache loaders arrive behind an `Arc`.
impl From<Arc<Error>> for Error {
    fn from(shared: Arc<Error>) -> Self {
        match shared.as_ref() {
            Self::Store {
                code,
                message,
                transient,
            } => Self::Store {
                code,
                message: message.clone(),
                transient: *transient,
            },
            Self::Import { code, message } => Self::Import {
                code,
                message: message.clone(),
            },
            Self::Config(msg) => Self::Config(msg.clone()),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Serialization(msg) => Self::Serialization(msg.clone()),
            Self::Internal(msg) => Self::Internal(msg.clone()),
        }
    }
}
