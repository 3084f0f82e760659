//! Upsert transform
//!
//! Re-streams a document and, at every node matching the target path, writes
//! the next replacement value. Nodes missing along the target are created:
//! keys are appended before their object closes, indices beyond an array's
//! length are padded with `null`, and a `null` standing in for an
//! intermediate container is replaced by synthesized structure. Positions
//! whose remaining segments contain a wildcard cannot be synthesized and
//! match nothing.

use crate::queue::ReplacementQueue;
use jenrich_codec::value_events;
use jenrich_format::{
    EnrichError, JsonEvent, PathExpression, PathSegment, PathTracker, Result,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Upsert behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOptions {
    /// Treat leftover replacement values as an error instead of a warning
    pub strict: bool,
}

/// Counters reported after an upsert pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertMetrics {
    /// Replacement values written
    pub matched: usize,
    /// Existing values replaced
    pub overwritten: usize,
    /// Values written at synthesized locations
    pub inserted: usize,
    /// Replacement values left over at the end of the document
    pub unconsumed: usize,
}

/// What a container on the target's route still has to provide
#[derive(Debug)]
enum Route {
    /// Off the target, or nothing can be created inside
    Off,
    /// Every child continues the route
    Wildcard,
    /// Object expecting the key named by `segment`
    Key { segment: usize, seen: bool },
    /// Array expecting the index named by `segment`
    Index { segment: usize },
}

/// Iterator adapter writing replacement values at a target path
pub struct UpsertTransform<I> {
    inner: I,
    target: PathExpression,
    replacements: ReplacementQueue,
    options: UpsertOptions,
    tracker: PathTracker,
    routes: Vec<Route>,
    skip_depth: usize,
    output: VecDeque<JsonEvent>,
    metrics: UpsertMetrics,
    done: bool,
}

impl<I> UpsertTransform<I>
where
    I: Iterator<Item = Result<JsonEvent>>,
{
    /// Wrap `events`; replacements are consumed in document order
    pub fn new(inner: I, target: PathExpression, replacements: impl Into<ReplacementQueue>) -> Self {
        Self {
            inner,
            target,
            replacements: replacements.into(),
            options: UpsertOptions::default(),
            tracker: PathTracker::new(),
            routes: Vec::new(),
            skip_depth: 0,
            output: VecDeque::new(),
            metrics: UpsertMetrics::default(),
            done: false,
        }
    }

    /// Replace the default options
    pub fn with_options(mut self, options: UpsertOptions) -> Self {
        self.options = options;
        self
    }

    /// Counters so far; final once the iterator is exhausted
    pub fn metrics(&self) -> UpsertMetrics {
        self.metrics
    }

    fn process(&mut self, event: JsonEvent) -> Result<()> {
        if self.skip_depth > 0 {
            self.tracker.apply(&event)?;
            match event {
                JsonEvent::ObjectStart | JsonEvent::ArrayStart => self.skip_depth += 1,
                JsonEvent::ObjectEnd | JsonEvent::ArrayEnd => self.skip_depth -= 1,
                _ => {}
            }
            return Ok(());
        }

        match event {
            JsonEvent::ObjectEnd | JsonEvent::ArrayEnd => {
                let route = self.routes.pop().ok_or_else(|| {
                    EnrichError::Internal(format!("unexpected {}", event.kind()))
                })?;
                // Array length must be read before the end event closes the frame
                self.create_missing(route)?;
                self.tracker.apply(&event)?;
                self.output.push_back(event);
            }
            JsonEvent::Key(ref name) => {
                self.tracker.apply(&event)?;
                if let Some(Route::Key { segment, seen }) = self.routes.last_mut() {
                    if matches!(&self.target.segments()[*segment], PathSegment::Key(k) if k == name)
                    {
                        *seen = true;
                    }
                }
                self.output.push_back(event);
            }
            JsonEvent::ObjectStart | JsonEvent::ArrayStart => {
                self.tracker.apply(&event)?;
                match self.target.match_prefix(self.tracker.steps()) {
                    Some(depth) if depth == self.target.len() => {
                        self.skip_depth = 1;
                        self.overwrite()?;
                    }
                    Some(depth) => {
                        let object = matches!(event, JsonEvent::ObjectStart);
                        let route = self.route_inside(depth, object);
                        self.routes.push(route);
                        self.output.push_back(event);
                    }
                    None => {
                        self.routes.push(Route::Off);
                        self.output.push_back(event);
                    }
                }
            }
            JsonEvent::Scalar(ref value) => {
                self.tracker.apply(&event)?;
                match self.target.match_prefix(self.tracker.steps()) {
                    Some(depth) if depth == self.target.len() => self.overwrite()?,
                    Some(depth) if value.is_null() => match self.synthesize(depth)? {
                        Some(created) => self.output.extend(value_events(&created)),
                        None => self.output.push_back(event),
                    },
                    Some(_) => {
                        debug!(
                            location = %self.tracker.trail(),
                            found = jenrich_format::type_name(value),
                            target = %self.target,
                            "scalar on the target route cannot hold the remaining segments, left untouched"
                        );
                        self.output.push_back(event);
                    }
                    None => self.output.push_back(event),
                }
            }
            JsonEvent::MaterializedValue { .. } => self.output.push_back(event),
        }
        Ok(())
    }

    fn route_inside(&self, depth: usize, object: bool) -> Route {
        match &self.target.segments()[depth] {
            PathSegment::Wildcard => Route::Wildcard,
            PathSegment::Key(_) if object => Route::Key {
                segment: depth,
                seen: false,
            },
            PathSegment::Index(_) if !object => Route::Index { segment: depth },
            segment => {
                debug!(
                    location = %self.tracker.trail(),
                    found = if object { "object" } else { "array" },
                    segment = ?segment,
                    target = %self.target,
                    "container on the target route cannot hold the next segment, left untouched"
                );
                Route::Off
            }
        }
    }

    fn create_missing(&mut self, route: Route) -> Result<()> {
        match route {
            Route::Key {
                segment,
                seen: false,
            } => {
                let PathSegment::Key(name) = &self.target.segments()[segment] else {
                    return Err(EnrichError::Internal("key route without a key".to_string()));
                };
                let name = name.clone();
                if let Some(created) = self.synthesize(segment + 1)? {
                    self.output.push_back(JsonEvent::Key(name));
                    self.output.extend(value_events(&created));
                }
            }
            Route::Index { segment } => {
                let PathSegment::Index(index) = self.target.segments()[segment] else {
                    return Err(EnrichError::Internal(
                        "index route without an index".to_string(),
                    ));
                };
                let len = self.tracker.array_len().unwrap_or(0);
                if index >= len {
                    if let Some(created) = self.synthesize(segment + 1)? {
                        self.output
                            .extend((len..index).map(|_| JsonEvent::Scalar(Value::Null)));
                        self.output.extend(value_events(&created));
                    }
                }
            }
            Route::Key { seen: true, .. } | Route::Wildcard | Route::Off => {}
        }
        Ok(())
    }

    /// Build the structure for `segments[from..]` around the next replacement
    fn synthesize(&mut self, from: usize) -> Result<Option<Value>> {
        let remaining = &self.target.segments()[from..];
        if remaining.contains(&PathSegment::Wildcard) {
            debug!(
                location = %self.tracker.trail(),
                target = %self.target,
                "missing structure under a wildcard cannot be created"
            );
            return Ok(None);
        }

        let mut value = self.take_replacement()?;
        for segment in self.target.segments()[from..].iter().rev() {
            value = match segment {
                PathSegment::Key(name) => {
                    let mut map = Map::new();
                    map.insert(name.clone(), value);
                    Value::Object(map)
                }
                PathSegment::Index(index) => {
                    let mut items = vec![Value::Null; *index];
                    items.push(value);
                    Value::Array(items)
                }
                PathSegment::Wildcard => {
                    return Err(EnrichError::Internal(
                        "wildcard reached during synthesis".to_string(),
                    ))
                }
            };
        }
        self.metrics.inserted += 1;
        Ok(Some(value))
    }

    fn overwrite(&mut self) -> Result<()> {
        let value = self.take_replacement()?;
        self.metrics.overwritten += 1;
        self.output.extend(value_events(&value));
        Ok(())
    }

    fn take_replacement(&mut self) -> Result<Value> {
        match self.replacements.pop() {
            Some(value) => {
                self.metrics.matched += 1;
                Ok(value)
            }
            None => Err(EnrichError::correlation(format!(
                "replacement values exhausted after {} match(es) of '{}' at {}",
                self.replacements.consumed(),
                self.target,
                self.tracker.trail()
            ))),
        }
    }

    fn finish(&mut self) -> Result<()> {
        let leftover = self.replacements.remaining();
        self.metrics.unconsumed = leftover;
        if leftover > 0 {
            let reason = format!(
                "{} replacement value(s) left over after {} match(es) of '{}'",
                leftover, self.metrics.matched, self.target
            );
            if self.options.strict {
                return Err(EnrichError::correlation(reason));
            }
            warn!("{}", reason);
        }
        debug!(
            matched = self.metrics.matched,
            overwritten = self.metrics.overwritten,
            inserted = self.metrics.inserted,
            "upsert pass complete"
        );
        Ok(())
    }
}

impl<I> Iterator for UpsertTransform<I>
where
    I: Iterator<Item = Result<JsonEvent>>,
{
    type Item = Result<JsonEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.output.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }

            let outcome = match self.inner.next() {
                Some(Ok(event)) => self.process(event),
                Some(Err(e)) => Err(e),
                None => {
                    self.done = true;
                    self.finish()
                }
            };
            if let Err(e) = outcome {
                self.done = true;
                self.output.clear();
                return Some(Err(e));
            }
        }
    }
}

/// Run an upsert over a complete event stream, collecting the result
pub fn upsert_events<I>(
    events: I,
    target: &PathExpression,
    replacements: Vec<Value>,
    options: UpsertOptions,
) -> Result<(Vec<JsonEvent>, UpsertMetrics)>
where
    I: IntoIterator<Item = Result<JsonEvent>>,
{
    let mut transform =
        UpsertTransform::new(events.into_iter(), target.clone(), replacements).with_options(options);
    let events = transform.by_ref().collect::<Result<Vec<_>>>()?;
    Ok((events, transform.metrics()))
}
