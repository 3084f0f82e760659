//! Structural JSON events and concrete node locations

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// One step of a concrete location: an object key or an array index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum TrailStep {
    /// Member of an object
    Key(String),
    /// Element of an array
    Index(usize),
}

impl From<&str> for TrailStep {
    fn from(key: &str) -> Self {
        TrailStep::Key(key.to_string())
    }
}

impl From<usize> for TrailStep {
    fn from(index: usize) -> Self {
        TrailStep::Index(index)
    }
}

/// Concrete location of a node, from the document root downwards
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Trail(Vec<TrailStep>);

impl Trail {
    /// The document root
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Steps from the root
    pub fn steps(&self) -> &[TrailStep] {
        &self.0
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the document root
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a step
    pub fn push(&mut self, step: TrailStep) {
        self.0.push(step);
    }

    /// Remove the last step
    pub fn pop(&mut self) -> Option<TrailStep> {
        self.0.pop()
    }

    /// A new trail extended by one step
    pub fn child(&self, step: TrailStep) -> Self {
        let mut steps = Vec::with_capacity(self.0.len() + 1);
        steps.extend_from_slice(&self.0);
        steps.push(step);
        Self(steps)
    }
}

impl From<Vec<TrailStep>> for Trail {
    fn from(steps: Vec<TrailStep>) -> Self {
        Self(steps)
    }
}

impl fmt::Display for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for step in &self.0 {
            match step {
                TrailStep::Key(key) => write_key_segment(f, key)?,
                TrailStep::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

impl Serialize for Trail {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Write a key either in dot form or, when needed, in quoted bracket form
pub(crate) fn write_key_segment(f: &mut fmt::Formatter<'_>, key: &str) -> fmt::Result {
    if is_plain_identifier(key) {
        write!(f, ".{}", key)
    } else {
        f.write_str("['")?;
        for ch in key.chars() {
            match ch {
                '\'' => f.write_str("\\'")?,
                '\\' => f.write_str("\\\\")?,
                other => write!(f, "{}", other)?,
            }
        }
        f.write_str("']")
    }
}

/// Keys that can be written after a dot without quoting
pub(crate) fn is_plain_identifier(key: &str) -> bool {
    !key.is_empty()
        && key != "*"
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// A structural event of a JSON document
///
/// Start/End events are always balanced in any sequence produced from valid
/// input. `MaterializedValue` follows the last structural event of the
/// subtree it reconstructs and never alters nesting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum JsonEvent {
    /// `{`
    ObjectStart,
    /// `}`
    ObjectEnd,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// Object member name; the member's value follows
    Key(String),
    /// Null, boolean, number or string
    Scalar(Value),
    /// Fully reconstructed subtree for a requested path of interest
    MaterializedValue {
        /// Index of the path of interest that matched
        pattern: usize,
        /// Concrete location of the subtree
        path: Trail,
        /// The reconstructed value
        value: Value,
    },
}

impl JsonEvent {
    /// True for events that begin a value (containers and scalars)
    pub fn starts_value(&self) -> bool {
        matches!(
            self,
            JsonEvent::ObjectStart | JsonEvent::ArrayStart | JsonEvent::Scalar(_)
        )
    }

    /// Short name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            JsonEvent::ObjectStart => "object start",
            JsonEvent::ObjectEnd => "object end",
            JsonEvent::ArrayStart => "array start",
            JsonEvent::ArrayEnd => "array end",
            JsonEvent::Key(_) => "key",
            JsonEvent::Scalar(_) => "scalar",
            JsonEvent::MaterializedValue { .. } => "materialized value",
        }
    }
}

/// Get a human-readable type name for a JSON value
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trail_display_uses_normalized_form() {
        let trail = Trail::from(vec![
            TrailStep::from("Clients"),
            TrailStep::from(2),
            TrailStep::from("odd key"),
            TrailStep::from("it's"),
        ]);
        assert_eq!(trail.to_string(), "$.Clients[2]['odd key']['it\\'s']");
        assert_eq!(Trail::root().to_string(), "$");
    }

    #[test]
    fn events_serialize_with_tag() {
        let key = serde_json::to_value(JsonEvent::Key("id".into())).unwrap();
        assert_eq!(key, json!({"event": "key", "data": "id"}));

        let start = serde_json::to_value(JsonEvent::ObjectStart).unwrap();
        assert_eq!(start, json!({"event": "object_start"}));

        let materialized = serde_json::to_value(JsonEvent::MaterializedValue {
            pattern: 0,
            path: Trail::from(vec![TrailStep::from("a"), TrailStep::from(0)]),
            value: json!({"x": 1}),
        })
        .unwrap();
        assert_eq!(
            materialized,
            json!({
                "event": "materialized_value",
                "data": {"pattern": 0, "path": "$.a[0]", "value": {"x": 1}}
            })
        );
    }

    #[test]
    fn starts_value_covers_scalars_and_containers() {
        assert!(JsonEvent::ObjectStart.starts_value());
        assert!(JsonEvent::Scalar(json!(1)).starts_value());
        assert!(!JsonEvent::Key("k".into()).starts_value());
        assert!(!JsonEvent::ArrayEnd.starts_value());
    }
}
