//! Error types for jenrich

use std::fmt;
use thiserror::Error;

/// Location inside the JSON text where parsing stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextPosition {
    /// Zero-based byte offset
    pub offset: usize,
    /// One-based line number
    pub line: usize,
    /// One-based column, counted in bytes
    pub column: usize,
}

impl TextPosition {
    /// Position of the first byte of a document
    pub fn start() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {} (byte {})",
            self.line, self.column, self.offset
        )
    }
}

/// jenrich error types
///
/// Every variant is fatal for the document being processed; no stage retries.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Input is not well-formed JSON.
    #[error("JSON parse error at {position}: {message}")]
    Parse {
        /// What the parser expected or rejected
        message: String,
        /// Best-effort location of the failure
        position: TextPosition,
    },

    /// A path or search expression could not be tokenized.
    #[error("Invalid path expression '{expression}': {reason}")]
    PathSyntax {
        /// The offending expression text
        expression: String,
        /// Why it was rejected
        reason: String,
    },

    /// A path resolved to zero nodes where at least one was required.
    #[error("Path '{expression}' did not match any value in the document")]
    Resolution {
        /// The expression that matched nothing
        expression: String,
    },

    /// Two positionally paired sequences disagree in length.
    #[error("Correlation error: {reason}")]
    Correlation {
        /// Description of the mismatch
        reason: String,
    },

    /// A configured limit was exceeded.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// The replacement source (e.g. a remote lookup) failed.
    #[error("Replacement source failed: {0}")]
    Replacement(String),

    /// I/O operation failed while reading input or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization of a value failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal invariant was violated (e.g. an ill-nested event sequence).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EnrichError {
    /// Build a [`EnrichError::PathSyntax`] error
    pub fn path_syntax(expression: &str, reason: impl Into<String>) -> Self {
        EnrichError::PathSyntax {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    /// Build a [`EnrichError::Correlation`] error
    pub fn correlation(reason: impl Into<String>) -> Self {
        EnrichError::Correlation {
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EnrichError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_reports_position() {
        let err = EnrichError::Parse {
            message: "expected ':'".to_string(),
            position: TextPosition {
                offset: 7,
                line: 2,
                column: 3,
            },
        };
        assert_eq!(
            err.to_string(),
            "JSON parse error at line 2, column 3 (byte 7): expected ':'"
        );
    }

    #[test]
    fn constructors_fill_fields() {
        let err = EnrichError::path_syntax("$.a.", "empty segment");
        assert!(matches!(
            err,
            EnrichError::PathSyntax { ref expression, .. } if expression == "$.a."
        ));
        let err = EnrichError::correlation("3 vs 2");
        assert_eq!(err.to_string(), "Correlation error: 3 vs 2");
    }
}
