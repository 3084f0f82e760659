//! Search expressions: a plain path or a `concat()` of several paths

use crate::error::{EnrichError, Result};
use crate::limits::Limits;
use crate::path::PathExpression;
use std::fmt;
use std::str::FromStr;

/// `concat(<delimiter>, <path>, <path>, ...)`
///
/// The delimiter is the single quoted literal among the arguments; it may
/// appear at any argument position. Every other argument is a path that
/// begins at the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatExpression {
    delimiter: String,
    paths: Vec<PathExpression>,
}

impl ConcatExpression {
    /// Build from parts; at least two paths are required
    pub fn new(delimiter: impl Into<String>, paths: Vec<PathExpression>) -> Result<Self> {
        let delimiter = delimiter.into();
        if paths.len() < 2 {
            return Err(EnrichError::path_syntax(
                "concat(...)",
                format!("concat() needs at least two paths, got {}", paths.len()),
            ));
        }
        Ok(Self { delimiter, paths })
    }

    /// Join string placed between the values of one position
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Sub-paths in argument order
    pub fn paths(&self) -> &[PathExpression] {
        &self.paths
    }

    /// Pair the per-path results positionally and join them
    ///
    /// Every column must be non-empty and all columns must have equal length.
    pub fn join_columns(&self, columns: &[Vec<String>]) -> Result<Vec<String>> {
        if columns.len() != self.paths.len() {
            return Err(EnrichError::Internal(format!(
                "concat() received {} result columns for {} paths",
                columns.len(),
                self.paths.len()
            )));
        }

        for (path, column) in self.paths.iter().zip(columns) {
            if column.is_empty() {
                return Err(EnrichError::correlation(format!(
                    "concat() sub-path '{}' matched no values",
                    path.source()
                )));
            }
        }

        let expected = columns[0].len();
        if let Some((path, column)) = self
            .paths
            .iter()
            .zip(columns)
            .find(|(_, column)| column.len() != expected)
        {
            return Err(EnrichError::correlation(format!(
                "concat() sub-paths disagree in length: '{}' matched {} values but '{}' matched {}",
                self.paths[0].source(),
                expected,
                path.source(),
                column.len()
            )));
        }

        Ok((0..expected)
            .map(|row| {
                columns
                    .iter()
                    .map(|column| column[row].as_str())
                    .collect::<Vec<_>>()
                    .join(&self.delimiter)
            })
            .collect())
    }
}

impl fmt::Display for ConcatExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted = serde_json::to_string(&self.delimiter).map_err(|_| fmt::Error)?;
        write!(f, "concat({}", quoted)?;
        for path in &self.paths {
            write!(f, ", {}", path)?;
        }
        f.write_str(")")
    }
}

/// What the search phase evaluates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchExpression {
    /// A single path; every match yields one search value
    Path(PathExpression),
    /// Several paths joined element-wise
    Concat(ConcatExpression),
}

impl SearchExpression {
    /// Parse a plain path or a `concat()` call using default limits
    pub fn parse(expression: &str) -> Result<Self> {
        Self::parse_with_limits(expression, &Limits::default())
    }

    /// Parse a plain path or a `concat()` call
    pub fn parse_with_limits(expression: &str, limits: &Limits) -> Result<Self> {
        let trimmed = expression.trim();
        if trimmed.len() > limits.max_expression_length {
            return Err(EnrichError::LimitExceeded(format!(
                "search expression is {} bytes (max: {})",
                trimmed.len(),
                limits.max_expression_length
            )));
        }

        match concat_arguments(trimmed)? {
            Some(inner) => parse_concat(expression, inner, limits).map(SearchExpression::Concat),
            None => PathExpression::parse_with_limits(trimmed, limits, false)
                .map(SearchExpression::Path),
        }
    }

    /// Every path this expression reads, in argument order
    pub fn paths(&self) -> &[PathExpression] {
        match self {
            SearchExpression::Path(path) => std::slice::from_ref(path),
            SearchExpression::Concat(concat) => concat.paths(),
        }
    }
}

impl fmt::Display for SearchExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchExpression::Path(path) => write!(f, "{}", path),
            SearchExpression::Concat(concat) => write!(f, "{}", concat),
        }
    }
}

impl FromStr for SearchExpression {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The text between `concat(` and the final `)`, if this is a concat call
fn concat_arguments(trimmed: &str) -> Result<Option<&str>> {
    let Some(rest) = trimmed.strip_prefix("concat") else {
        return Ok(None);
    };
    let rest = rest.trim_start();
    let Some(rest) = rest.strip_prefix('(') else {
        // A key that merely starts with "concat", e.g. `concatenated.value`
        return Ok(None);
    };
    match rest.strip_suffix(')') {
        Some(inner) => Ok(Some(inner)),
        None => Err(EnrichError::path_syntax(trimmed, "concat( is missing its closing ')'")),
    }
}

fn parse_concat(original: &str, inner: &str, limits: &Limits) -> Result<ConcatExpression> {
    let mut delimiter: Option<String> = None;
    let mut paths = Vec::new();

    for argument in split_arguments(original, inner)? {
        let argument = argument.trim();
        if argument.is_empty() {
            return Err(EnrichError::path_syntax(original, "concat() has an empty argument"));
        }

        if argument.starts_with('"') || argument.starts_with('\'') {
            let literal = parse_literal(original, argument)?;
            if delimiter.replace(literal).is_some() {
                return Err(EnrichError::path_syntax(
                    original,
                    "concat() accepts exactly one quoted delimiter",
                ));
            }
        } else {
            paths.push(PathExpression::parse_with_limits(argument, limits, true)?);
        }
    }

    let Some(delimiter) = delimiter else {
        return Err(EnrichError::path_syntax(
            original,
            "concat() requires a quoted delimiter argument",
        ));
    };

    if paths.len() < 2 {
        return Err(EnrichError::path_syntax(
            original,
            format!("concat() needs at least two paths, got {}", paths.len()),
        ));
    }

    if paths.len() > limits.max_concat_paths {
        return Err(EnrichError::LimitExceeded(format!(
            "concat() has {} paths (max: {})",
            paths.len(),
            limits.max_concat_paths
        )));
    }

    Ok(ConcatExpression { delimiter, paths })
}

/// Split on commas that are outside quotes
fn split_arguments<'a>(original: &str, inner: &'a str) -> Result<Vec<&'a str>> {
    let mut arguments = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, ch) in inner.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            ',' => {
                arguments.push(&inner[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(EnrichError::path_syntax(original, "unterminated string literal in concat()"));
    }
    arguments.push(&inner[start..]);
    Ok(arguments)
}

/// Decode a quoted delimiter
///
/// Double-quoted literals are JSON strings. Single-quoted literals accept
/// the same escapes plus `\'`.
fn parse_literal(original: &str, argument: &str) -> Result<String> {
    if argument.starts_with('"') {
        return serde_json::from_str::<String>(argument).map_err(|e| {
            EnrichError::path_syntax(
                original,
                format!("invalid delimiter literal {}: {}", argument, e),
            )
        });
    }

    let mut chars = argument.chars().skip(1);
    let mut out = String::new();
    let mut closed = false;

    while let Some(ch) = chars.next() {
        if closed {
            return Err(EnrichError::path_syntax(
                original,
                format!("unexpected text after delimiter literal {}", argument),
            ));
        }
        match ch {
            '\\' => {
                let decoded = match chars.next() {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('b') => '\u{08}',
                    Some('f') => '\u{0c}',
                    Some(c @ ('\'' | '"' | '\\' | '/')) => c,
                    Some('u') => unicode_escape(original, &mut chars)?,
                    Some(other) => {
                        return Err(EnrichError::path_syntax(
                            original,
                            format!("invalid escape '\\{}' in delimiter literal", other),
                        ))
                    }
                    None => {
                        return Err(EnrichError::path_syntax(
                            original,
                            "unterminated escape in delimiter literal",
                        ))
                    }
                };
                out.push(decoded);
            }
            '\'' => closed = true,
            c => out.push(c),
        }
    }

    if !closed {
        return Err(EnrichError::path_syntax(original, "unterminated delimiter literal"));
    }
    Ok(out)
}

/// `\uXXXX`, with a following `\uXXXX` low surrogate when needed
fn unicode_escape(original: &str, chars: &mut impl Iterator<Item = char>) -> Result<char> {
    fn hex4(chars: &mut dyn Iterator<Item = char>) -> Option<u16> {
        let digits: String = chars.take(4).collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        u16::from_str_radix(&digits, 16).ok()
    }

    let invalid =
        || EnrichError::path_syntax(original, "invalid \\u escape in delimiter literal");
    let first = hex4(&mut *chars).ok_or_else(invalid)?;
    let mut units = vec![first];
    if (0xD800..0xDC00).contains(&first) {
        if chars.next() != Some('\\') || chars.next() != Some('u') {
            return Err(invalid());
        }
        units.push(hex4(&mut *chars).ok_or_else(invalid)?);
    }
    match char::decode_utf16(units).collect::<Vec<_>>().as_slice() {
        [Ok(ch)] => Ok(*ch),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathSegment;

    #[test]
    fn parses_plain_path() {
        let expr = SearchExpression::parse("$.Clients[*].ClientID").unwrap();
        assert!(matches!(expr, SearchExpression::Path(_)));
        assert_eq!(expr.paths().len(), 1);
    }

    #[test]
    fn parses_concat_with_leading_delimiter() {
        let expr = SearchExpression::parse(r#"concat("-", $.a[*].x, $.a[*].y)"#).unwrap();
        let SearchExpression::Concat(concat) = expr else {
            panic!("expected concat");
        };
        assert_eq!(concat.delimiter(), "-");
        assert_eq!(concat.paths().len(), 2);
        assert_eq!(concat.paths()[1].segments()[2], PathSegment::Key("y".into()));
    }

    #[test]
    fn parses_concat_with_inline_delimiter() {
        let expr = SearchExpression::parse(
            r#"concat($.Clients[*].ClientID,"-",$.Clients[*].ClaimID)"#,
        )
        .unwrap();
        let SearchExpression::Concat(concat) = expr else {
            panic!("expected concat");
        };
        assert_eq!(concat.delimiter(), "-");
        assert_eq!(concat.paths()[0].source(), "$.Clients[*].ClientID");
        assert_eq!(concat.paths()[1].source(), "$.Clients[*].ClaimID");
    }

    #[test]
    fn delimiter_may_contain_commas_and_quotes() {
        let expr = SearchExpression::parse(r#"concat(', \'', $.a, $['b,c'])"#).unwrap();
        let SearchExpression::Concat(concat) = expr else {
            panic!("expected concat");
        };
        assert_eq!(concat.delimiter(), ", '");
        assert_eq!(concat.paths()[1].segments(), &[PathSegment::Key("b,c".into())]);
    }

    #[test]
    fn concat_rejects_bad_arguments() {
        for bad in [
            r#"concat("-", $.a)"#,
            r#"concat($.a, $.b)"#,
            r#"concat("-", "+", $.a, $.b)"#,
            r#"concat("-", a.b, $.c)"#,
            r#"concat("-", $.a, , $.b)"#,
            r#"concat("-, $.a, $.b)"#,
            r#"concat("-", $.a, $.b"#,
            r#"concat("-"x, $.a, $.b)"#,
        ] {
            assert!(
                matches!(SearchExpression::parse(bad), Err(EnrichError::PathSyntax { .. })),
                "expected syntax error for {}",
                bad
            );
        }
    }

    #[test]
    fn concat_enforces_path_limit() {
        let limits = Limits {
            max_concat_paths: 2,
            ..Limits::default()
        };
        let result = SearchExpression::parse_with_limits(r#"concat("-", $.a, $.b, $.c)"#, &limits);
        assert!(matches!(result, Err(EnrichError::LimitExceeded(_))));
    }

    #[test]
    fn key_starting_with_concat_is_a_path() {
        let expr = SearchExpression::parse("concatenated.value").unwrap();
        assert!(matches!(expr, SearchExpression::Path(_)));
    }

    #[test]
    fn join_columns_pairs_positions() {
        let concat = ConcatExpression::new(
            "-",
            vec![
                PathExpression::parse("$.a[*].x").unwrap(),
                PathExpression::parse("$.a[*].y").unwrap(),
            ],
        )
        .unwrap();
        let joined = concat
            .join_columns(&[
                vec!["1".to_string(), "2".to_string()],
                vec!["A".to_string(), "B".to_string()],
            ])
            .unwrap();
        assert_eq!(joined, vec!["1-A", "2-B"]);
    }

    #[test]
    fn join_columns_rejects_mismatch_and_empty() {
        let concat = ConcatExpression::new(
            "-",
            vec![
                PathExpression::parse("$.x").unwrap(),
                PathExpression::parse("$.y").unwrap(),
            ],
        )
        .unwrap();
        assert!(matches!(
            concat.join_columns(&[vec!["1".into()], vec!["A".into(), "B".into()]]),
            Err(EnrichError::Correlation { .. })
        ));
        assert!(matches!(
            concat.join_columns(&[vec![], vec![]]),
            Err(EnrichError::Correlation { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        let expr = SearchExpression::parse(r#"concat($.a,"-",$.b)"#).unwrap();
        assert_eq!(expr.to_string(), r#"concat("-", $.a, $.b)"#);
        assert_eq!(SearchExpression::parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn delimiter_escapes_decode_and_display_losslessly() {
        for (expression, expected) in [
            (r#"concat("\r\n", $.a, $.b)"#, "\r\n"),
            (r#"concat("\b\f\/", $.a, $.b)"#, "\u{08}\u{0c}/"),
            (r#"concat("\u00e9\ud83d\ude00", $.a, $.b)"#, "\u{e9}\u{1f600}"),
            (r"concat('\r\n', $.a, $.b)", "\r\n"),
            (r"concat('\u00e9\ud83d\ude00\'', $.a, $.b)", "\u{e9}\u{1f600}'"),
        ] {
            let expr = SearchExpression::parse(expression).unwrap();
            let SearchExpression::Concat(concat) = &expr else {
                panic!("expected concat for {}", expression);
            };
            assert_eq!(concat.delimiter(), expected, "{}", expression);
            assert_eq!(SearchExpression::parse(&expr.to_string()).unwrap(), expr);
        }

        for bad in [
            r#"concat("\x", $.a, $.b)"#,
            r"concat('\x', $.a, $.b)",
            r"concat('\ud83d', $.a, $.b)",
            r"concat('\u12', $.a, $.b)",
        ] {
            assert!(SearchExpression::parse(bad).is_err(), "{}", bad);
        }
    }
}
