//! jenrich Format - Core primitives for streaming JSON enrichment
//!
//! This crate provides the vocabulary shared by the parser, the resolver and
//! the transforms, with no I/O dependencies. It includes:
//!
//! - Structural JSON events and concrete node locations
//! - Path expressions and `concat()` search expressions
//! - Explicit frame-stack position tracking
//! - Error types
//! - Expression limits

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod expression;
pub mod limits;
pub mod path;
pub mod position;

// Re-export commonly used types
pub use error::{EnrichError, Result, TextPosition};
pub use event::{type_name, JsonEvent, Trail, TrailStep};
pub use expression::{ConcatExpression, SearchExpression};
pub use limits::Limits;
pub use path::{PathExpression, PathSegment, StepRef};
pub use position::{PathTracker, Transition};

/// A resolved node: where it is and what it holds
///
/// Matches are held by value; nothing refers back into the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedNode {
    /// Concrete location of the node
    pub trail: Trail,
    /// The node's value
    pub value: serde_json::Value,
}

impl MatchedNode {
    /// Pair a location with a value
    pub fn new(trail: Trail, value: serde_json::Value) -> Self {
        Self { trail, value }
    }
}

/// Render a matched value as a search string
///
/// Strings are used verbatim, other scalars in their JSON text form and
/// containers as compact JSON.
pub fn search_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
