//! Error types for the name-blocking engine
//!
//! The guiding principle is that configuration problems are loud at startup
//! while hot-path problems never interfere with query handling: everything in
//! this module is produced during engine construction or rule loading. The
//! audit sink swallows its own I/O errors once it is running.
//!
//! # Example
//!
//! ```
//! use nameblock::BlockError;
//!
//! let err = BlockError::syntax(12, "unexpected @ character");
//! assert!(err.to_string().contains("line 12"));
//! assert_eq!(err.line(), Some(12));
//! ```

use std::io;

use thiserror::Error;

/// Error types for the name-blocking engine
///
/// Every variant is raised during startup (configuration validation, rule
/// loading, audit sink creation). Query-time evaluation is infallible.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Invalid configuration
    ///
    /// Raised when a configuration value cannot be used, e.g. an unknown
    /// audit format string. Fatal: the engine refuses to start.
    #[error("Invalid blocking configuration: {reason}")]
    ConfigError {
        /// Description of the configuration error
        reason: String,
        /// The configuration field that is invalid, if applicable
        field: Option<String>,
    },

    /// Rule syntax error
    ///
    /// Raised by the pattern compiler for a malformed pattern. The loader
    /// logs these with the offending line number and keeps going; one bad
    /// line never aborts a load.
    #[error("Syntax error in block rules at line {line}: {reason}")]
    SyntaxError {
        /// 1-based line number in the rule file
        line: usize,
        /// Description of what is wrong with the pattern
        reason: String,
    },

    /// I/O error
    ///
    /// Raised when the rule file cannot be read or the audit log cannot be
    /// opened. Runtime audit writes do not produce this; they are
    /// best-effort and silently dropped.
    #[error("I/O error: {reason}")]
    IoError {
        /// Description of the failed operation
        reason: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl BlockError {
    /// Create a configuration error
    ///
    /// # Example
    ///
    /// ```
    /// use nameblock::BlockError;
    ///
    /// let err = BlockError::config("rules file path is empty");
    /// assert!(err.to_string().contains("rules file path"));
    /// ```
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
            field: None,
        }
    }

    /// Create a configuration error with field context
    pub fn config_field(reason: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
            field: Some(field.into()),
        }
    }

    /// Create a rule syntax error for a 1-based line number
    pub fn syntax(line: usize, reason: impl Into<String>) -> Self {
        Self::SyntaxError {
            line,
            reason: reason.into(),
        }
    }

    /// Create an I/O error with operation context
    pub fn io(reason: impl Into<String>, source: io::Error) -> Self {
        Self::IoError {
            reason: reason.into(),
            source,
        }
    }

    /// Check if this error is a rule syntax error
    #[must_use]
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::SyntaxError { .. })
    }

    /// Get the rule-file line number associated with this error, if any
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::SyntaxError { line, .. } => Some(*line),
            _ => None,
        }
    }
}

impl From<io::Error> for BlockError {
    fn from(err: io::Error) -> Self {
        Self::IoError {
            reason: err.to_string(),
            source: err,
        }
    }
}

/// Type alias for Result with [`BlockError`]
pub type BlockResult<T> = std::result::Result<T, BlockError>;
