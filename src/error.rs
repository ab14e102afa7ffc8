//! Error types for sqlbatch.
//!
//! Defines the main error enum used throughout the runtime.

use thiserror::Error;

/// Main error type for sqlbatch operations.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Credential file missing, unreadable or malformed, bad paths, etc.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Warehouse session errors (host unreachable, auth failed, closed session).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement rejected by the warehouse, carrying its numeric error code.
    #[error("SQL error {code}: {message}")]
    Statement { code: i64, message: String },

    /// Local file errors while exporting, importing or reading scripts.
    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed import data or schema.
    #[error("Import error: {0}")]
    Import(String),

    /// The exit controller has decided to stop the job.
    #[error("Job halted with error code {code}")]
    Halt { code: i64 },

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a statement error with the warehouse error code and message.
    pub fn statement(code: i64, msg: impl Into<String>) -> Self {
        Self::Statement {
            code,
            message: msg.into(),
        }
    }

    /// Creates an I/O error with the given message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Creates an import error with the given message.
    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the warehouse error code for classifiable statement errors.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Statement { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this error is the exit controller stopping the job.
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt { .. })
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "Configuration Error",
            Self::Connection(_) => "Connection Error",
            Self::Statement { .. } => "SQL Error",
            Self::Io(_) => "I/O Error",
            Self::Import(_) => "Import Error",
            Self::Halt { .. } => "Halted",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<std::io::Error> for BatchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result type alias using BatchError.
pub type Result<T> = std::result::Result<T, BatchError>;
