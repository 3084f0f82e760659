//! jenrich Codec - Streaming JSON engines
//!
//! This crate turns JSON text into structural events and back:
//!
//! - Incremental pull parser producing [`JsonEvent`]s from any reader
//! - Materializing transform that rebuilds subtrees at paths of interest
//! - Event serializer with compact and pretty output
//! - Conversions between events and `serde_json::Value`

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod materialize;
pub mod parser;
pub mod value;
pub mod writer;

// Re-export commonly used types
pub use jenrich_format::{EnrichError, JsonEvent, PathExpression, Result, Trail};

// Re-export our own types
pub use materialize::Materializer;
pub use parser::EventParser;
pub use value::{build_value, value_events, Built, ValueBuilder};
pub use writer::{events_to_string, write_events, EventWriter, WriterOptions};

use std::io::Read;

/// Parse a complete document held in memory into its event sequence
pub fn parse_events(text: &str) -> Result<Vec<JsonEvent>> {
    EventParser::from_text(text).collect()
}

/// Parse a document from a reader into a `serde_json::Value`
///
/// The whole stream is consumed so trailing content is still rejected.
pub fn parse_value<R: Read>(reader: R) -> Result<serde_json::Value> {
    let mut builder = ValueBuilder::new();
    let mut root = None;
    for event in EventParser::new(reader) {
        if let Built::Complete(value) = builder.push(&event?)? {
            root = Some(value);
        }
    }
    root.ok_or_else(|| EnrichError::Internal("document produced no value".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_value_matches_serde() {
        let text = r#"{"b": [1, 2.5, "x"], "a": {"n": null}}"#;
        let ours = parse_value(text.as_bytes()).unwrap();
        let theirs: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(ours, theirs);
        let keys: Vec<&String> = ours.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn parse_value_rejects_trailing_content() {
        assert!(matches!(
            parse_value(&b"{} []"[..]),
            Err(EnrichError::Parse { .. })
        ));
    }

    #[test]
    fn parse_events_then_serialize_round_trips() {
        let text = r#"{"k":[true,false,null,-0.5,"s"]}"#;
        let events = parse_events(text).unwrap();
        assert_eq!(events_to_string(&events).unwrap(), text);
        assert_eq!(build_value(events.into_iter().map(Ok)).unwrap(), json!({"k": [true, false, null, -0.5, "s"]}));
    }
}
