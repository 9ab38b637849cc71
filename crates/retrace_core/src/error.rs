//! Core error types for retrace.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Parse error
    ParseError { message: String },

    /// Requested lines fall outside the source file
    LineOutOfRange {
        /// First requested line (1-based)
        start: i64,
        /// Last requested line (1-based, inclusive)
        end: i64,
        /// Number of lines in the file
        available: usize,
    },

    /// Source file could not be read
    Io { path: String, reason: String },

    /// Not found
    NotFound { kind: String, id: String },

    /// Method is unresolved and has no source
    Unresolved { method: String },

    /// Internal error (broken invariant, never expected from user input)
    Internal {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Shorthand for a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError { message } => write!(f, "Parse error: {}", message),
            Self::LineOutOfRange {
                start,
                end,
                available,
            } => write!(
                f,
                "Line range [{},{}] out of bounds for file with {} lines",
                start, end, available
            ),
            Self::Io { path, reason } => write!(f, "Unable to read {}: {}", path, reason),
            Self::NotFound { kind, id } => write!(f, "{} not found: {}", kind, id),
            Self::Unresolved { method } => write!(f, "Method has no resolved source: {}", method),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::num::ParseIntError> for CoreError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}
