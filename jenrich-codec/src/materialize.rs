//! Materializing transform
//!
//! Forwards every event unchanged and, for each completed subtree whose
//! location matches a path of interest, appends one
//! [`JsonEvent::MaterializedValue`] per matching path. Only subtrees rooted at
//! a matching location are buffered.

use crate::value::{Built, ValueBuilder};
use jenrich_format::{JsonEvent, PathExpression, PathTracker, Result, Transition};
use serde_json::Value;
use std::collections::VecDeque;

/// Iterator adapter that reconstructs subtrees at the configured paths
pub struct Materializer<I> {
    inner: I,
    patterns: Vec<PathExpression>,
    tracker: PathTracker,
    builder: ValueBuilder,
    queued: VecDeque<JsonEvent>,
    failed: bool,
}

impl<I> Materializer<I>
where
    I: Iterator<Item = Result<JsonEvent>>,
{
    /// Wrap an event stream with a fixed set of paths of interest
    pub fn new(inner: I, patterns: Vec<PathExpression>) -> Self {
        Self {
            inner,
            patterns,
            tracker: PathTracker::new(),
            builder: ValueBuilder::new(),
            queued: VecDeque::new(),
            failed: false,
        }
    }

    /// Bound the nesting of materialized subtrees (see [`ValueBuilder::with_max_depth`])
    ///
    /// Deeper subtrees at a path of interest end the stream with
    /// [`jenrich_format::EnrichError::LimitExceeded`]; unmatched regions are
    /// never bounded.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.builder = ValueBuilder::with_max_depth(max_depth);
        self
    }

    /// Paths of interest, indexed as in [`JsonEvent::MaterializedValue::pattern`]
    pub fn patterns(&self) -> &[PathExpression] {
        &self.patterns
    }

    fn matching_patterns(&self) -> Vec<usize> {
        self.patterns
            .iter()
            .enumerate()
            .filter(|(_, pattern)| pattern.matches(self.tracker.steps()))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn observe(&mut self, event: &JsonEvent) -> Result<()> {
        match self.tracker.apply(event)? {
            Transition::ContainerStart => {
                if !self.builder.is_idle() || !self.matching_patterns().is_empty() {
                    self.builder.push(event)?;
                }
            }
            Transition::Key => {
                if !self.builder.is_idle() {
                    self.builder.push(event)?;
                }
            }
            Transition::Scalar | Transition::ContainerEnd => {
                if self.builder.is_idle() {
                    // Containers that were not buffered at their start cannot match here
                    if let JsonEvent::Scalar(value) = event {
                        let matched = self.matching_patterns();
                        self.emit(matched, value.clone());
                    }
                    return Ok(());
                }
                match self.builder.push(event)? {
                    Built::Complete(value) => {
                        let matched = self.matching_patterns();
                        self.emit(matched, value);
                    }
                    Built::Attached => {
                        let matched = self.matching_patterns();
                        if !matched.is_empty() {
                            if let Some(value) = self.builder.last_attached().cloned() {
                                self.emit(matched, value);
                            }
                        }
                    }
                    Built::Pending => {}
                }
            }
            Transition::Annotation => {}
        }
        Ok(())
    }

    fn emit(&mut self, matched: Vec<usize>, value: Value) {
        let Some((&last, rest)) = matched.split_last() else {
            return;
        };
        let path = self.tracker.trail();
        for &pattern in rest {
            self.queued.push_back(JsonEvent::MaterializedValue {
                pattern,
                path: path.clone(),
                value: value.clone(),
            });
        }
        self.queued.push_back(JsonEvent::MaterializedValue {
            pattern: last,
            path,
            value,
        });
    }
}

impl<I> Iterator for Materializer<I>
where
    I: Iterator<Item = Result<JsonEvent>>,
{
    type Item = Result<JsonEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.queued.pop_front() {
            return Some(Ok(event));
        }
        if self.failed {
            return None;
        }

        let event = match self.inner.next()? {
            Ok(event) => event,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        if let Err(e) = self.observe(&event) {
            self.failed = true;
            return Some(Err(e));
        }
        Some(Ok(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::EventParser;
    use jenrich_format::EnrichError;
    use serde_json::json;

    fn materialized(text: &str, paths: &[&str]) -> Vec<(usize, String, Value)> {
        let patterns = paths
            .iter()
            .map(|p| PathExpression::parse(p).unwrap())
            .collect();
        EventParser::from_text(text)
            .materializing(patterns)
            .map(|event| event.unwrap())
            .filter_map(|event| match event {
                JsonEvent::MaterializedValue {
                    pattern,
                    path,
                    value,
                } => Some((pattern, path.to_string(), value)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn materializes_wildcard_matches_in_document_order() {
        let got = materialized(
            r#"{"a": [{"x": "1"}, {"y": 2}, {"x": "3"}], "x": "top"}"#,
            &["$.a[*].x"],
        );
        assert_eq!(
            got,
            vec![
                (0, "$.a[0].x".to_string(), json!("1")),
                (0, "$.a[2].x".to_string(), json!("3")),
            ]
        );
    }

    #[test]
    fn materializes_containers_and_nested_overlaps() {
        let got = materialized(r#"{"a": [{"x": 1}, [2]]}"#, &["$.a", "$.a[*]"]);
        assert_eq!(
            got,
            vec![
                (1, "$.a[0]".to_string(), json!({"x": 1})),
                (1, "$.a[1]".to_string(), json!([2])),
                (0, "$.a".to_string(), json!([{"x": 1}, [2]])),
            ]
        );
    }

    #[test]
    fn same_node_matching_two_patterns_emits_both() {
        let got = materialized(r#"{"a": {"b": true}}"#, &["$.a.b", "$.*.b"]);
        assert_eq!(
            got,
            vec![
                (0, "$.a.b".to_string(), json!(true)),
                (1, "$.a.b".to_string(), json!(true)),
            ]
        );
    }

    #[test]
    fn forwards_every_structural_event() {
        let text = r#"{"a": [1, {"b": 2}]}"#;
        let plain: Vec<JsonEvent> = EventParser::from_text(text).map(|e| e.unwrap()).collect();
        let forwarded: Vec<JsonEvent> = EventParser::from_text(text)
            .materializing(vec![PathExpression::parse("$.a[1]").unwrap()])
            .map(|e| e.unwrap())
            .filter(|e| !matches!(e, JsonEvent::MaterializedValue { .. }))
            .collect();
        assert_eq!(plain, forwarded);
    }

    #[test]
    fn materialized_event_follows_subtree_end() {
        let events: Vec<JsonEvent> = EventParser::from_text(r#"[{"k": 1}]"#)
            .materializing(vec![PathExpression::parse("$[0]").unwrap()])
            .map(|e| e.unwrap())
            .collect();
        let idx = events
            .iter()
            .position(|e| matches!(e, JsonEvent::MaterializedValue { .. }))
            .unwrap();
        assert_eq!(events[idx - 1], JsonEvent::ObjectEnd);
        assert_eq!(events[idx + 1], JsonEvent::ArrayEnd);
    }

    #[test]
    fn root_path_materializes_whole_document() {
        let got = materialized(r#"{"a": 1}"#, &["$"]);
        assert_eq!(got, vec![(0, "$".to_string(), json!({"a": 1}))]);
    }

    #[test]
    fn parse_errors_propagate() {
        let result: Result<Vec<JsonEvent>> = EventParser::from_text(r#"{"a": [1,}"#)
            .materializing(vec![PathExpression::parse("$.a").unwrap()])
            .collect();
        assert!(result.is_err());
    }

    #[test]
    fn deep_subtree_at_a_path_of_interest_is_a_limit_error() {
        let depth = 50_000;
        let text = format!(
            r#"{{"deep": {}{}, "id": 1}}"#,
            "[".repeat(depth),
            "]".repeat(depth)
        );
        let result: Result<Vec<JsonEvent>> = EventParser::from_text(&text)
            .materializing(vec![PathExpression::parse("$.deep").unwrap()])
            .collect();
        assert!(matches!(result, Err(EnrichError::LimitExceeded(_))));

        // Unmatched depth streams through untouched
        let got = materialized(&text, &["$.id"]);
        assert_eq!(got, vec![(0, "$.id".to_string(), json!(1))]);
    }

    #[test]
    fn max_depth_is_configurable() {
        let text = r#"{"a": [[1]]}"#;
        let pattern = || vec![PathExpression::parse("$.a").unwrap()];
        let shallow: Result<Vec<JsonEvent>> = EventParser::from_text(text)
            .materializing(pattern())
            .with_max_depth(1)
            .collect();
        assert!(shallow.is_err());
        let enough: Result<Vec<JsonEvent>> = EventParser::from_text(text)
            .materializing(pattern())
            .with_max_depth(2)
            .collect();
        assert!(enough.is_ok());
    }
}
