//! Path resolution in materialized and streaming mode

use jenrich_codec::Materializer;
use jenrich_format::{
    EnrichError, JsonEvent, MatchedNode, PathExpression, PathSegment, Result, Trail, TrailStep,
};
use serde_json::Value;

/// Resolve a path against an in-memory document
///
/// Matches come back in document order. A path that leads nowhere yields an
/// empty list; branches missing a segment are skipped.
pub fn resolve(document: &Value, path: &PathExpression) -> Vec<MatchedNode> {
    let mut frontier: Vec<(Trail, &Value)> = vec![(Trail::root(), document)];

    for segment in path.segments() {
        let mut next = Vec::with_capacity(frontier.len());
        for (trail, node) in frontier {
            match (segment, node) {
                (PathSegment::Key(name), Value::Object(map)) => {
                    if let Some(child) = map.get(name) {
                        next.push((trail.child(TrailStep::Key(name.clone())), child));
                    }
                }
                (PathSegment::Index(index), Value::Array(items)) => {
                    if let Some(child) = items.get(*index) {
                        next.push((trail.child(TrailStep::Index(*index)), child));
                    }
                }
                (PathSegment::Wildcard, Value::Object(map)) => {
                    next.extend(
                        map.iter()
                            .map(|(key, child)| (trail.child(TrailStep::Key(key.clone())), child)),
                    );
                }
                (PathSegment::Wildcard, Value::Array(items)) => {
                    next.extend(
                        items
                            .iter()
                            .enumerate()
                            .map(|(index, child)| (trail.child(TrailStep::Index(index)), child)),
                    );
                }
                _ => {}
            }
        }
        if next.is_empty() {
            return Vec::new();
        }
        frontier = next;
    }

    frontier
        .into_iter()
        .map(|(trail, value)| MatchedNode::new(trail, value.clone()))
        .collect()
}

/// Resolve a path, failing when nothing matches
pub fn resolve_required(document: &Value, path: &PathExpression) -> Result<Vec<MatchedNode>> {
    let matches = resolve(document, path);
    if matches.is_empty() {
        return Err(EnrichError::Resolution {
            expression: path.source().to_string(),
        });
    }
    Ok(matches)
}

/// Resolve a path against a live event stream
///
/// A node is matched when its last event has been seen; only matching
/// subtrees are buffered.
pub fn resolve_events<I>(events: I, path: &PathExpression) -> Result<Vec<MatchedNode>>
where
    I: IntoIterator<Item = Result<JsonEvent>>,
{
    let mut matches = Vec::new();
    for event in Materializer::new(events.into_iter(), vec![path.clone()]) {
        if let JsonEvent::MaterializedValue { path, value, .. } = event? {
            matches.push(MatchedNode::new(path, value));
        }
    }
    Ok(matches)
}
