//! Restricted JSONPath-like path expressions
//!
//! Supported syntax:
//!
//! - optional `$` root marker (`$.a.b` and `a.b` are equivalent)
//! - dot segments: `.name`, `.*`
//! - bracket segments: `[3]`, `[*]`, `['quoted key']`, `["quoted key"]`
//!
//! Filters, slices, unions and recursive descent are not supported.

use crate::error::{EnrichError, Result};
use crate::event::{write_key_segment, Trail, TrailStep};
use crate::limits::Limits;
use std::fmt;
use std::str::FromStr;

/// Borrowed view of one concrete location step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRef<'a> {
    /// Member of an object
    Key(&'a str),
    /// Element of an array
    Index(usize),
}

impl TrailStep {
    /// Borrow this step for matching
    pub fn as_step_ref(&self) -> StepRef<'_> {
        match self {
            TrailStep::Key(key) => StepRef::Key(key),
            TrailStep::Index(index) => StepRef::Index(*index),
        }
    }
}

/// One segment of a path expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Literal object key
    Key(String),
    /// Array index
    Index(usize),
    /// Every child of an array or object
    Wildcard,
}

impl PathSegment {
    /// Whether a concrete step satisfies this segment
    pub fn matches(&self, step: StepRef<'_>) -> bool {
        match (self, step) {
            (PathSegment::Wildcard, _) => true,
            (PathSegment::Key(expected), StepRef::Key(actual)) => expected == actual,
            (PathSegment::Index(expected), StepRef::Index(actual)) => *expected == actual,
            _ => false,
        }
    }
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExpression {
    source: String,
    segments: Vec<PathSegment>,
}

impl PathExpression {
    /// Parse an expression; the `$` root marker is optional
    pub fn parse(expression: &str) -> Result<Self> {
        Self::parse_with_limits(expression, &Limits::default(), false)
    }

    /// Parse an expression that must begin with the `$` root marker
    pub fn parse_rooted(expression: &str) -> Result<Self> {
        Self::parse_with_limits(expression, &Limits::default(), true)
    }

    /// Parse with explicit limits
    pub fn parse_with_limits(expression: &str, limits: &Limits, require_root: bool) -> Result<Self> {
        if expression.len() > limits.max_expression_length {
            return Err(EnrichError::LimitExceeded(format!(
                "path expression is {} bytes (max: {})",
                expression.len(),
                limits.max_expression_length
            )));
        }

        let segments = SegmentParser::new(expression).parse(require_root)?;

        if segments.len() > limits.max_path_segments {
            return Err(EnrichError::LimitExceeded(format!(
                "path '{}' has {} segments (max: {})",
                expression.trim(),
                segments.len(),
                limits.max_path_segments
            )));
        }

        Ok(Self {
            source: expression.trim().to_string(),
            segments,
        })
    }

    /// Build an expression directly from segments
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        let mut expr = Self {
            source: String::new(),
            segments,
        };
        expr.source = expr.to_string();
        expr
    }

    /// The expression text as supplied by the caller
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed segments
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the root expression `$`
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when any segment is a wildcard
    pub fn has_wildcard(&self) -> bool {
        self.segments.contains(&PathSegment::Wildcard)
    }

    /// Whether a concrete location matches the whole expression
    pub fn matches<'a, I>(&self, steps: I) -> bool
    where
        I: IntoIterator<Item = StepRef<'a>>,
    {
        matches!(self.match_prefix(steps), Some(n) if n == self.segments.len())
    }

    /// Whether a trail matches the whole expression
    pub fn matches_trail(&self, trail: &Trail) -> bool {
        self.matches(trail.steps().iter().map(TrailStep::as_step_ref))
    }

    /// If the location matches the first `n` segments, return `n`
    ///
    /// Returns `None` when the location is deeper than the expression or
    /// diverges from it.
    pub fn match_prefix<'a, I>(&self, steps: I) -> Option<usize>
    where
        I: IntoIterator<Item = StepRef<'a>>,
    {
        let mut matched = 0;
        for step in steps {
            let segment = self.segments.get(matched)?;
            if !segment.matches(step) {
                return None;
            }
            matched += 1;
        }
        Some(matched)
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => write_key_segment(f, key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
                PathSegment::Wildcard => f.write_str("[*]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for PathExpression {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Character-level tokenizer for path expressions
struct SegmentParser<'a> {
    original: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> SegmentParser<'a> {
    fn new(original: &'a str) -> Self {
        Self {
            original,
            chars: original.trim().chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> EnrichError {
        EnrichError::path_syntax(self.original, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn parse(mut self, require_root: bool) -> Result<Vec<PathSegment>> {
        if self.chars.is_empty() {
            return Err(self.error("expression is empty"));
        }

        let mut segments = Vec::new();

        if self.peek() == Some('$') {
            self.pos += 1;
            match self.peek() {
                None | Some('.') | Some('[') => {}
                Some(other) => {
                    return Err(self.error(format!(
                        "expected '.' or '[' after the root marker, found '{}'",
                        other
                    )))
                }
            }
        } else if require_root {
            return Err(self.error("path must begin with the '$' root marker"));
        } else {
            // Root marker stripped by the caller: `a.b`, `.a.b` and `[0].a` are accepted
            match self.peek() {
                Some('.') | Some('[') => {}
                _ => segments.push(self.dotted_segment()?),
            }
        }

        while let Some(ch) = self.peek() {
            match ch {
                '.' => {
                    self.pos += 1;
                    segments.push(self.dotted_segment()?);
                }
                '[' => {
                    self.pos += 1;
                    segments.push(self.bracket_segment()?);
                }
                other => {
                    return Err(self.error(format!(
                        "unexpected '{}' at position {}",
                        other, self.pos
                    )))
                }
            }
        }

        Ok(segments)
    }

    fn dotted_segment(&mut self) -> Result<PathSegment> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch == '.' || ch == '[' || ch == ']' {
                break;
            }
            self.pos += 1;
        }

        if start == self.pos {
            return Err(match self.peek() {
                None => self.error("empty final segment"),
                Some('.') => self.error("empty segment (recursive descent is not supported)"),
                Some(other) => self.error(format!("empty segment before '{}'", other)),
            });
        }

        let name: String = self.chars[start..self.pos].iter().collect();
        if name == "*" {
            Ok(PathSegment::Wildcard)
        } else {
            Ok(PathSegment::Key(name))
        }
    }

    fn bracket_segment(&mut self) -> Result<PathSegment> {
        self.skip_whitespace();
        let segment = match self.peek() {
            None => return Err(self.error("unterminated '['")),
            Some('*') => {
                self.pos += 1;
                PathSegment::Wildcard
            }
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                PathSegment::Key(self.quoted(quote)?)
            }
            Some(ch) if ch.is_ascii_digit() => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| self.error(format!("index '{}' is out of range", digits)))?;
                PathSegment::Index(index)
            }
            Some(']') => return Err(self.error("empty brackets")),
            Some(other) => {
                return Err(self.error(format!(
                    "brackets must contain an index, '*' or a quoted key, found '{}'",
                    other
                )))
            }
        };
        self.skip_whitespace();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(segment)
            }
            None => Err(self.error("unterminated '['")),
            Some(other) => Err(self.error(format!("expected ']', found '{}'", other))),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated quoted key")),
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(escaped) => {
                            out.push(escaped);
                            self.pos += 1;
                        }
                        None => return Err(self.error("unterminated escape in quoted key")),
                    }
                }
                Some(ch) if ch == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(ch) => {
                    out.push(ch);
                    self.pos += 1;
                }
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }
}
