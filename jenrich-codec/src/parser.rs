//! Incremental JSON event parser
//!
//! The grammar is driven by an explicit container stack, so nesting depth is
//! bounded only by memory.

use crate::materialize::Materializer;
use jenrich_format::{EnrichError, JsonEvent, PathExpression, Result, TextPosition};
use serde_json::{Number, Value};
use std::collections::HashSet;
use std::io::{ErrorKind, Read};

const READ_BUFFER_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting any value
    Value,
    /// After `{`: a key or `}`
    ObjectFirst,
    /// After `,` in an object: a key
    ObjectKey,
    /// After a key: `:`
    Colon,
    /// After a member value: `,` or `}`
    ObjectNext,
    /// After `[`: a value or `]`
    ArrayFirst,
    /// After an element: `,` or `]`
    ArrayNext,
    /// Root value complete: only whitespace may follow
    Trailing,
    /// End of input reached cleanly
    Done,
}

/// Buffered byte reader that tracks line and column
struct ByteSource<R> {
    reader: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    position: TextPosition,
}

impl<R: Read> ByteSource<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0u8; READ_BUFFER_BYTES].into_boxed_slice(),
            pos: 0,
            len: 0,
            position: TextPosition::start(),
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        if self.pos == self.len {
            loop {
                match self.reader.read(&mut self.buf) {
                    Ok(n) => {
                        self.pos = 0;
                        self.len = n;
                        break;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(EnrichError::Io(e)),
                }
            }
            if self.len == 0 {
                return Ok(None);
            }
        }
        Ok(Some(self.buf[self.pos]))
    }

    fn bump(&mut self) -> Result<Option<u8>> {
        let byte = self.peek()?;
        if let Some(b) = byte {
            self.pos += 1;
            self.position.offset += 1;
            if b == b'\n' {
                self.position.line += 1;
                self.position.column = 1;
            } else {
                self.position.column += 1;
            }
        }
        Ok(byte)
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek()? {
            self.bump()?;
        }
        Ok(())
    }
}

/// Lazy, non-restartable sequence of [`JsonEvent`]s over a reader
///
/// Iteration stops after the first error; a failed document yields no
/// further events. A key repeated within one object is a parse error.
pub struct EventParser<R: Read> {
    source: ByteSource<R>,
    containers: Vec<Container>,
    /// Keys seen so far, one set per open object
    object_keys: Vec<HashSet<String>>,
    state: State,
    started: bool,
    finished: bool,
}

impl<R: Read> EventParser<R> {
    /// Create a parser over any reader
    pub fn new(reader: R) -> Self {
        Self {
            source: ByteSource::new(reader),
            containers: Vec::new(),
            object_keys: Vec::new(),
            state: State::Value,
            started: false,
            finished: false,
        }
    }

    /// Current location in the input
    pub fn position(&self) -> TextPosition {
        self.source.position
    }

    /// Number of currently open containers
    pub fn depth(&self) -> usize {
        self.containers.len()
    }

    /// Wrap the parser so that subtrees at `paths` are also emitted as
    /// [`JsonEvent::MaterializedValue`]
    pub fn materializing(self, paths: Vec<PathExpression>) -> Materializer<Self> {
        Materializer::new(self, paths)
    }

    fn error(&self, message: impl Into<String>) -> EnrichError {
        EnrichError::Parse {
            message: message.into(),
            position: self.source.position,
        }
    }

    fn unexpected(&self, found: Option<u8>, expected: &str) -> EnrichError {
        match found {
            None => self.error(format!("unexpected end of input, expected {}", expected)),
            Some(b) => self.error(format!(
                "unexpected {}, expected {}",
                describe_byte(b),
                expected
            )),
        }
    }

    fn step(&mut self) -> Result<Option<JsonEvent>> {
        loop {
            self.source.skip_whitespace()?;
            let next = self.source.peek()?;
            match self.state {
                State::Value => return self.value(next).map(Some),
                State::ObjectFirst => match next {
                    Some(b'}') => {
                        self.source.bump()?;
                        return self.close(Container::Object).map(Some);
                    }
                    Some(b'"') => return self.key().map(Some),
                    other => return Err(self.unexpected(other, "a string key or '}'")),
                },
                State::ObjectKey => match next {
                    Some(b'"') => return self.key().map(Some),
                    other => return Err(self.unexpected(other, "a string key")),
                },
                State::Colon => match next {
                    Some(b':') => {
                        self.source.bump()?;
                        self.state = State::Value;
                    }
                    other => return Err(self.unexpected(other, "':'")),
                },
                State::ObjectNext => match next {
                    Some(b',') => {
                        self.source.bump()?;
                        self.state = State::ObjectKey;
                    }
                    Some(b'}') => {
                        self.source.bump()?;
                        return self.close(Container::Object).map(Some);
                    }
                    other => return Err(self.unexpected(other, "',' or '}'")),
                },
                State::ArrayFirst => match next {
                    Some(b']') => {
                        self.source.bump()?;
                        return self.close(Container::Array).map(Some);
                    }
                    _ => self.state = State::Value,
                },
                State::ArrayNext => match next {
                    Some(b',') => {
                        self.source.bump()?;
                        self.state = State::Value;
                    }
                    Some(b']') => {
                        self.source.bump()?;
                        return self.close(Container::Array).map(Some);
                    }
                    other => return Err(self.unexpected(other, "',' or ']'")),
                },
                State::Trailing => match next {
                    None => {
                        self.state = State::Done;
                        return Ok(None);
                    }
                    Some(b) => {
                        return Err(self.error(format!(
                            "unexpected {} after the document root",
                            describe_byte(b)
                        )))
                    }
                },
                State::Done => return Ok(None),
            }
        }
    }

    fn value(&mut self, next: Option<u8>) -> Result<JsonEvent> {
        let Some(byte) = next else {
            return Err(if self.started {
                self.error("unexpected end of input, expected a value")
            } else {
                self.error("empty input")
            });
        };
        self.started = true;

        match byte {
            b'{' => {
                self.source.bump()?;
                self.containers.push(Container::Object);
                self.object_keys.push(HashSet::new());
                self.state = State::ObjectFirst;
                Ok(JsonEvent::ObjectStart)
            }
            b'[' => {
                self.source.bump()?;
                self.containers.push(Container::Array);
                self.state = State::ArrayFirst;
                Ok(JsonEvent::ArrayStart)
            }
            b'"' => {
                let text = self.string()?;
                self.after_value();
                Ok(JsonEvent::Scalar(Value::String(text)))
            }
            b't' => self.literal(b"true", Value::Bool(true)),
            b'f' => self.literal(b"false", Value::Bool(false)),
            b'n' => self.literal(b"null", Value::Null),
            b'-' | b'0'..=b'9' => {
                let number = self.number()?;
                self.after_value();
                Ok(JsonEvent::Scalar(Value::Number(number)))
            }
            other => Err(self.unexpected(Some(other), "a value")),
        }
    }

    fn key(&mut self) -> Result<JsonEvent> {
        let name = self.string()?;
        let fresh = match self.object_keys.last_mut() {
            Some(keys) => keys.insert(name.clone()),
            None => return Err(self.error("key outside of an object")),
        };
        if !fresh {
            return Err(self.error(format!("duplicate key '{}' in object", name)));
        }
        self.state = State::Colon;
        Ok(JsonEvent::Key(name))
    }

    fn close(&mut self, container: Container) -> Result<JsonEvent> {
        match self.containers.pop() {
            Some(open) if open == container => {}
            _ => return Err(self.error("mismatched closing bracket")),
        }
        if container == Container::Object {
            self.object_keys.pop();
        }
        self.after_value();
        Ok(match container {
            Container::Object => JsonEvent::ObjectEnd,
            Container::Array => JsonEvent::ArrayEnd,
        })
    }

    fn after_value(&mut self) {
        self.state = match self.containers.last() {
            None => State::Trailing,
            Some(Container::Object) => State::ObjectNext,
            Some(Container::Array) => State::ArrayNext,
        };
    }

    fn literal(&mut self, word: &'static [u8], value: Value) -> Result<JsonEvent> {
        for expected in word {
            match self.source.bump()? {
                Some(b) if b == *expected => {}
                _ => {
                    return Err(self.error(format!(
                        "invalid literal, expected '{}'",
                        String::from_utf8_lossy(word)
                    )))
                }
            }
        }
        self.after_value();
        Ok(JsonEvent::Scalar(value))
    }

    fn string(&mut self) -> Result<String> {
        // opening quote
        self.source.bump()?;
        let mut bytes = Vec::new();

        loop {
            let Some(byte) = self.source.bump()? else {
                return Err(self.error("unterminated string"));
            };
            match byte {
                b'"' => break,
                b'\\' => self.escape(&mut bytes)?,
                b if b < 0x20 => {
                    return Err(self.error(format!(
                        "unescaped control character {:#04x} in string",
                        b
                    )))
                }
                b => bytes.push(b),
            }
        }

        String::from_utf8(bytes).map_err(|_| self.error("invalid UTF-8 in string"))
    }

    fn escape(&mut self, bytes: &mut Vec<u8>) -> Result<()> {
        let Some(kind) = self.source.bump()? else {
            return Err(self.error("unterminated escape sequence"));
        };
        let ch = match kind {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{08}',
            b'f' => '\u{0c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => self.unicode_escape()?,
            other => {
                return Err(self.error(format!(
                    "invalid escape sequence '\\{}'",
                    char::from(other)
                )))
            }
        };
        let mut encoded = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
        Ok(())
    }

    fn unicode_escape(&mut self) -> Result<char> {
        let first = self.hex4()?;
        let code = match first {
            0xD800..=0xDBFF => {
                if self.source.bump()? != Some(b'\\') || self.source.bump()? != Some(b'u') {
                    return Err(self.error("unpaired high surrogate in \\u escape"));
                }
                let second = self.hex4()?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(self.error("invalid low surrogate in \\u escape"));
                }
                0x10000 + ((u32::from(first) - 0xD800) << 10) + (u32::from(second) - 0xDC00)
            }
            0xDC00..=0xDFFF => return Err(self.error("unpaired low surrogate in \\u escape")),
            other => u32::from(other),
        };
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode scalar in \\u escape"))
    }

    fn hex4(&mut self) -> Result<u16> {
        let mut code: u16 = 0;
        for _ in 0..4 {
            let digit = match self.source.bump()? {
                Some(b) => char::from(b).to_digit(16),
                None => None,
            };
            let Some(digit) = digit else {
                return Err(self.error("expected four hex digits in \\u escape"));
            };
            code = (code << 4) | digit as u16;
        }
        Ok(code)
    }

    fn number(&mut self) -> Result<Number> {
        let mut text = String::new();
        let mut is_integer = true;

        if self.source.peek()? == Some(b'-') {
            self.source.bump()?;
            text.push('-');
        }

        match self.source.peek()? {
            Some(b'0') => {
                self.source.bump()?;
                text.push('0');
            }
            Some(b'1'..=b'9') => self.digits(&mut text)?,
            _ => return Err(self.error("invalid number, expected a digit")),
        }

        if self.source.peek()? == Some(b'.') {
            self.source.bump()?;
            text.push('.');
            is_integer = false;
            if !matches!(self.source.peek()?, Some(b'0'..=b'9')) {
                return Err(self.error("invalid number, expected a digit after '.'"));
            }
            self.digits(&mut text)?;
        }

        if let Some(marker @ (b'e' | b'E')) = self.source.peek()? {
            self.source.bump()?;
            text.push(char::from(marker));
            is_integer = false;
            if let Some(sign @ (b'+' | b'-')) = self.source.peek()? {
                self.source.bump()?;
                text.push(char::from(sign));
            }
            if !matches!(self.source.peek()?, Some(b'0'..=b'9')) {
                return Err(self.error("invalid number, expected a digit in the exponent"));
            }
            self.digits(&mut text)?;
        }

        if is_integer {
            if let Ok(value) = text.parse::<u64>() {
                return Ok(Number::from(value));
            }
            if text != "-0" {
                if let Ok(value) = text.parse::<i64>() {
                    return Ok(Number::from(value));
                }
            }
        }

        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .ok_or_else(|| self.error(format!("number {} is out of range", text)))
    }

    fn digits(&mut self, text: &mut String) -> Result<()> {
        while let Some(b @ b'0'..=b'9') = self.source.peek()? {
            self.source.bump()?;
            text.push(char::from(b));
        }
        Ok(())
    }
}

impl<'a> EventParser<&'a [u8]> {
    /// Parser over an in-memory byte slice
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }

    /// Parser over an in-memory string
    pub fn from_text(text: &'a str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl<R: Read> Iterator for EventParser<R> {
    type Item = Result<JsonEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for EventParser<R> {}

fn describe_byte(byte: u8) -> String {
    if byte.is_ascii_graphic() {
        format!("'{}'", char::from(byte))
    } else {
        format!("byte {:#04x}", byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events(text: &str) -> Result<Vec<JsonEvent>> {
        EventParser::from_text(text).collect()
    }

    fn parse_error(text: &str) -> (String, TextPosition) {
        match events(text) {
            Err(EnrichError::Parse { message, position }) => (message, position),
            other => panic!("expected parse error for {:?}, got {:?}", text, other),
        }
    }

    #[test]
    fn emits_structural_events_in_order() {
        let got = events(r#"{"a": [1, "two", null], "b": {}}"#).unwrap();
        assert_eq!(
            got,
            vec![
                JsonEvent::ObjectStart,
                JsonEvent::Key("a".into()),
                JsonEvent::ArrayStart,
                JsonEvent::Scalar(json!(1)),
                JsonEvent::Scalar(json!("two")),
                JsonEvent::Scalar(json!(null)),
                JsonEvent::ArrayEnd,
                JsonEvent::Key("b".into()),
                JsonEvent::ObjectStart,
                JsonEvent::ObjectEnd,
                JsonEvent::ObjectEnd,
            ]
        );
    }

    #[test]
    fn parses_scalar_roots() {
        assert_eq!(events(" true ").unwrap(), vec![JsonEvent::Scalar(json!(true))]);
        assert_eq!(events("-12").unwrap(), vec![JsonEvent::Scalar(json!(-12))]);
        assert_eq!(events("\"x\"").unwrap(), vec![JsonEvent::Scalar(json!("x"))]);
    }

    #[test]
    fn parses_numbers() {
        let got = events("[0, -1, 18446744073709551615, 1.5, -2e3, 1E-2, 0.25e+1]").unwrap();
        let values: Vec<Value> = got
            .into_iter()
            .filter_map(|event| match event {
                JsonEvent::Scalar(v) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(
            values,
            vec![
                json!(0),
                json!(-1),
                json!(u64::MAX),
                json!(1.5),
                json!(-2000.0),
                json!(0.01),
                json!(2.5)
            ]
        );
    }

    #[test]
    fn decodes_string_escapes() {
        let got = events(r#""a\"b\\c\/d\n\t\u00e9\ud83d\ude00""#).unwrap();
        assert_eq!(got, vec![JsonEvent::Scalar(json!("a\"b\\c/d\n\té😀"))]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(parse_error("").0, "empty input");
        assert_eq!(parse_error("  \n ").0, "empty input");
    }

    #[test]
    fn malformed_documents_fail_with_position() {
        let (message, position) = parse_error("{\n  \"a\" 1}");
        assert!(message.contains("expected ':'"), "{}", message);
        assert_eq!(position.line, 2);

        for bad in [
            "[1,]",
            "{\"a\":1,}",
            "{1:2}",
            "[1 2]",
            "[1}",
            "{\"a\":1]",
            "tru",
            "nul",
            "01",
            "1.",
            "-",
            "1e",
            "\"abc",
            "\"bad \\x escape\"",
            "\"\\ud800\"",
            "\"\\udc00\"",
            "\"tab\there\"",
            "{} {}",
            "[",
            "{\"a\":",
            "1e999",
        ] {
            assert!(
                matches!(events(bad), Err(EnrichError::Parse { .. })),
                "expected parse error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn rejects_duplicate_keys_within_one_object() {
        let (message, position) = parse_error(r#"{"a": 1, "a": 2}"#);
        assert_eq!(message, "duplicate key 'a' in object");
        assert_eq!(position.line, 1);
        assert!(events(r#"[{"a": {"b": 1, "c": {"b": 2}}}, {"a": 3, "b": 4}]"#).is_ok());
        assert!(events(r#"{"k": {"k": {"k": null}}, "j": [{"k": 1}, {"k": 2}]}"#).is_ok());
        assert!(events(r#"{"x": {}, "y": {"x": 1, "x": 2}}"#).is_err());
    }

    #[test]
    fn rejects_invalid_utf8() {
        let bytes = b"\"\xff\"";
        let result: Result<Vec<_>> = EventParser::from_slice(bytes).collect();
        assert!(matches!(result, Err(EnrichError::Parse { .. })));
    }

    #[test]
    fn stops_after_first_error() {
        let mut parser = EventParser::from_text("[1, x, 2]");
        assert!(matches!(parser.next(), Some(Ok(JsonEvent::ArrayStart))));
        assert!(matches!(parser.next(), Some(Ok(JsonEvent::Scalar(_)))));
        assert!(matches!(parser.next(), Some(Err(_))));
        assert!(parser.next().is_none());
    }

    #[test]
    fn handles_pathological_depth_without_recursion() {
        let depth = 100_000;
        let text = format!("{}{}", "[".repeat(depth), "]".repeat(depth));
        let mut parser = EventParser::from_text(&text);
        let mut count = 0;
        let mut max_depth = 0;
        while let Some(event) = parser.next() {
            event.unwrap();
            max_depth = max_depth.max(parser.depth());
            count += 1;
        }
        assert_eq!(count, depth * 2);
        assert_eq!(max_depth, depth);
    }

    #[test]
    fn reads_across_buffer_boundaries() {
        let long = "x".repeat(READ_BUFFER_BYTES * 3 + 17);
        let text = format!("{{\"k\": \"{}\"}}", long);
        let got = events(&text).unwrap();
        assert_eq!(got[2], JsonEvent::Scalar(Value::String(long)));
    }
}
