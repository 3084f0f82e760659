//! Event serializer

use jenrich_format::{EnrichError, JsonEvent, Result};
use std::io::Write;

/// Output formatting options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Two-space indentation and one member per line
    pub pretty: bool,
}

#[derive(Debug)]
struct WriteFrame {
    object: bool,
    members: usize,
}

/// Writes a well-nested event sequence as JSON text
///
/// [`JsonEvent::MaterializedValue`] events produce no output.
pub struct EventWriter<W: Write> {
    writer: W,
    options: WriterOptions,
    stack: Vec<WriteFrame>,
    after_key: bool,
    root_written: bool,
}

impl<W: Write> EventWriter<W> {
    /// Create a writer
    pub fn new(writer: W, options: WriterOptions) -> Self {
        Self {
            writer,
            options,
            stack: Vec::new(),
            after_key: false,
            root_written: false,
        }
    }

    /// Write one event
    pub fn write_event(&mut self, event: &JsonEvent) -> Result<()> {
        match event {
            JsonEvent::ObjectStart => {
                self.before_value()?;
                self.writer.write_all(b"{")?;
                self.stack.push(WriteFrame {
                    object: true,
                    members: 0,
                });
            }
            JsonEvent::ArrayStart => {
                self.before_value()?;
                self.writer.write_all(b"[")?;
                self.stack.push(WriteFrame {
                    object: false,
                    members: 0,
                });
            }
            JsonEvent::ObjectEnd => self.close(true)?,
            JsonEvent::ArrayEnd => self.close(false)?,
            JsonEvent::Key(name) => {
                let depth = self.stack.len();
                let pretty = self.options.pretty;
                match self.stack.last_mut() {
                    Some(frame) if frame.object && !self.after_key => {
                        if frame.members > 0 {
                            self.writer.write_all(b",")?;
                        }
                        frame.members += 1;
                    }
                    _ => {
                        return Err(EnrichError::Internal(format!(
                            "key '{}' is not valid at this point of the document",
                            name
                        )))
                    }
                }
                if pretty {
                    write_indent(&mut self.writer, depth)?;
                }
                serde_json::to_writer(&mut self.writer, name)?;
                self.writer
                    .write_all(if pretty { b": " } else { b":" })?;
                self.after_key = true;
            }
            JsonEvent::Scalar(value) => {
                self.before_value()?;
                serde_json::to_writer(&mut self.writer, value)?;
            }
            JsonEvent::MaterializedValue { .. } => {}
        }
        Ok(())
    }

    /// Check the document is complete, flush, and return the sink
    pub fn finish(mut self) -> Result<W> {
        if !self.stack.is_empty() || self.after_key {
            return Err(EnrichError::Internal(format!(
                "document ended with {} unclosed container(s)",
                self.stack.len()
            )));
        }
        if !self.root_written {
            return Err(EnrichError::Internal("no value was written".to_string()));
        }
        if self.options.pretty {
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn before_value(&mut self) -> Result<()> {
        let depth = self.stack.len();
        match self.stack.last_mut() {
            None => {
                if self.root_written {
                    return Err(EnrichError::Internal(
                        "more than one root value".to_string(),
                    ));
                }
                self.root_written = true;
            }
            Some(frame) if frame.object => {
                if !self.after_key {
                    return Err(EnrichError::Internal(
                        "object member value without a key".to_string(),
                    ));
                }
                self.after_key = false;
            }
            Some(frame) => {
                if frame.members > 0 {
                    self.writer.write_all(b",")?;
                }
                frame.members += 1;
                if self.options.pretty {
                    write_indent(&mut self.writer, depth)?;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, object: bool) -> Result<()> {
        if self.after_key {
            return Err(EnrichError::Internal(
                "container closed after a key without a value".to_string(),
            ));
        }
        let frame = match self.stack.pop() {
            Some(frame) if frame.object == object => frame,
            _ => {
                return Err(EnrichError::Internal(format!(
                    "unbalanced {} end",
                    if object { "object" } else { "array" }
                )))
            }
        };
        if self.options.pretty && frame.members > 0 {
            write_indent(&mut self.writer, self.stack.len())?;
        }
        self.writer
            .write_all(if object { b"}" } else { b"]" })?;
        Ok(())
    }
}

fn write_indent<W: Write>(writer: &mut W, depth: usize) -> std::io::Result<()> {
    writer.write_all(b"\n")?;
    for _ in 0..depth {
        writer.write_all(b"  ")?;
    }
    Ok(())
}

/// Serialize an event stream into `writer`
pub fn write_events<I, W>(events: I, writer: W, options: WriterOptions) -> Result<W>
where
    I: IntoIterator<Item = Result<JsonEvent>>,
    W: Write,
{
    let mut out = EventWriter::new(writer, options);
    for event in events {
        out.write_event(&event?)?;
    }
    out.finish()
}

/// Serialize events into a compact JSON string
pub fn events_to_string(events: &[JsonEvent]) -> Result<String> {
    let bytes = write_events(
        events.iter().cloned().map(Ok),
        Vec::new(),
        WriterOptions::default(),
    )?;
    String::from_utf8(bytes).map_err(|e| EnrichError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::EventParser;
    use crate::value::value_events;
    use serde_json::json;

    fn rewrite(text: &str, options: WriterOptions) -> String {
        let bytes = write_events(EventParser::from_text(text), Vec::new(), options).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn compact_output_matches_serde() {
        let value = json!({"a": [1, "two", null, {"b": false}], "c": {}, "d": []});
        let text = rewrite(&value.to_string(), WriterOptions::default());
        assert_eq!(text, serde_json::to_string(&value).unwrap());
    }

    #[test]
    fn pretty_output_matches_serde() {
        let value = json!({"a": [1, {"b": "x"}], "empty": {}, "none": []});
        let text = rewrite(&value.to_string(), WriterOptions { pretty: true });
        assert_eq!(text, format!("{}\n", serde_json::to_string_pretty(&value).unwrap()));
    }

    #[test]
    fn escapes_keys_and_strings() {
        let value = json!({"q\"uote": "line\nbreak"});
        let text = events_to_string(&value_events(&value)).unwrap();
        assert_eq!(text, r#"{"q\"uote":"line\nbreak"}"#);
    }

    #[test]
    fn materialized_values_are_not_written() {
        let events = vec![
            JsonEvent::ArrayStart,
            JsonEvent::Scalar(json!(1)),
            JsonEvent::MaterializedValue {
                pattern: 0,
                path: Default::default(),
                value: json!(1),
            },
            JsonEvent::ArrayEnd,
        ];
        assert_eq!(events_to_string(&events).unwrap(), "[1]");
    }

    #[test]
    fn rejects_ill_nested_sequences() {
        let bad: Vec<Vec<JsonEvent>> = vec![
            vec![JsonEvent::ObjectStart, JsonEvent::ArrayEnd],
            vec![JsonEvent::ObjectStart, JsonEvent::Scalar(json!(1))],
            vec![JsonEvent::ArrayStart, JsonEvent::Key("k".into())],
            vec![JsonEvent::ObjectStart],
            vec![JsonEvent::Scalar(json!(1)), JsonEvent::Scalar(json!(2))],
            vec![
                JsonEvent::ObjectStart,
                JsonEvent::Key("k".into()),
                JsonEvent::ObjectEnd,
            ],
            vec![],
        ];
        for events in bad {
            assert!(
                matches!(events_to_string(&events), Err(EnrichError::Internal(_))),
                "expected nesting error for {:?}",
                events
            );
        }
    }
}
