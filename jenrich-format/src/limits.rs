//! Expression limits and configuration

use crate::error::{EnrichError, Result};

/// Limits applied to expressions and to materialized values
///
/// Document nesting depth is not limited: the parser keeps its
/// own explicit stack. Only subtrees rebuilt as `serde_json::Value`
/// are bounded by `max_value_depth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum expression length in bytes (default: 1,024, hard: 16,384)
    pub max_expression_length: usize,
    /// Maximum segments per path (default: 64, hard: 1,024)
    pub max_path_segments: usize,
    /// Maximum path arguments inside one `concat()` (default: 16, hard: 256)
    pub max_concat_paths: usize,
    /// Maximum nesting of a materialized value (default: 128, hard: 1,024)
    pub max_value_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_expression_length: 1_024,
            max_path_segments: 64,
            max_concat_paths: 16,
            max_value_depth: 128,
        }
    }
}

impl Limits {
    /// Hard maximum limits that cannot be exceeded
    pub fn hard_maximums() -> Self {
        Self {
            max_expression_length: 16_384,
            max_path_segments: 1_024,
            max_concat_paths: 256,
            max_value_depth: 1_024,
        }
    }

    /// Validate limits against hard maximums
    pub fn validate(&self) -> Result<()> {
        let hard = Self::hard_maximums();

        if self.max_expression_length > hard.max_expression_length {
            return Err(EnrichError::LimitExceeded(format!(
                "max_expression_length {} exceeds hard limit {}",
                self.max_expression_length, hard.max_expression_length
            )));
        }

        if self.max_path_segments > hard.max_path_segments {
            return Err(EnrichError::LimitExceeded(format!(
                "max_path_segments {} exceeds hard limit {}",
                self.max_path_segments, hard.max_path_segments
            )));
        }

        if self.max_concat_paths > hard.max_concat_paths {
            return Err(EnrichError::LimitExceeded(format!(
                "max_concat_paths {} exceeds hard limit {}",
                self.max_concat_paths, hard.max_concat_paths
            )));
        }

        if self.max_value_depth == 0 || self.max_value_depth > hard.max_value_depth {
            return Err(EnrichError::LimitExceeded(format!(
                "max_value_depth {} must be between 1 and {}",
                self.max_value_depth, hard.max_value_depth
            )));
        }

        Ok(())
    }
}
