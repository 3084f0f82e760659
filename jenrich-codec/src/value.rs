//! Conversions between event sequences and `serde_json::Value`

use jenrich_format::{EnrichError, JsonEvent, Limits, Result};
use serde_json::{Map, Value};

#[derive(Debug)]
enum Partial {
    Object {
        map: Map<String, Value>,
        key: Option<String>,
    },
    Array(Vec<Value>),
}

/// Outcome of feeding one event to a [`ValueBuilder`]
#[derive(Debug, PartialEq)]
pub enum Built {
    /// The event opened a container or named a key
    Pending,
    /// A value was completed and attached to its parent container;
    /// see [`ValueBuilder::last_attached`]
    Attached,
    /// The outermost value is complete; the builder is idle again
    Complete(Value),
}

/// Incremental value reconstruction with an explicit stack
///
/// Built values are bounded in depth: `serde_json::Value` clones, drops and
/// serializes recursively, so deeper subtrees fail with
/// [`EnrichError::LimitExceeded`] instead.
#[derive(Debug)]
pub struct ValueBuilder {
    stack: Vec<Partial>,
    max_depth: usize,
}

impl Default for ValueBuilder {
    fn default() -> Self {
        Self::with_max_depth(Limits::default().max_value_depth)
    }
}

impl ValueBuilder {
    /// Idle builder with the default depth limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle builder accepting at most `max_depth` nested containers
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            max_depth,
        }
    }

    fn open(&mut self, partial: Partial) -> Result<Built> {
        if self.stack.len() >= self.max_depth {
            return Err(EnrichError::LimitExceeded(format!(
                "materialized value nests deeper than {} levels",
                self.max_depth
            )));
        }
        self.stack.push(partial);
        Ok(Built::Pending)
    }

    /// True when no value is under construction
    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    /// Feed one event
    pub fn push(&mut self, event: &JsonEvent) -> Result<Built> {
        match event {
            JsonEvent::ObjectStart => self.open(Partial::Object {
                map: Map::new(),
                key: None,
            }),
            JsonEvent::ArrayStart => self.open(Partial::Array(Vec::new())),
            JsonEvent::Key(name) => match self.stack.last_mut() {
                Some(Partial::Object { key, .. }) => {
                    *key = Some(name.clone());
                    Ok(Built::Pending)
                }
                _ => Err(EnrichError::Internal(format!(
                    "key '{}' outside of an object",
                    name
                ))),
            },
            JsonEvent::Scalar(value) => self.attach(value.clone()),
            JsonEvent::ObjectEnd => match self.stack.pop() {
                Some(Partial::Object { map, .. }) => self.attach(Value::Object(map)),
                _ => Err(EnrichError::Internal(
                    "object end without a matching object start".to_string(),
                )),
            },
            JsonEvent::ArrayEnd => match self.stack.pop() {
                Some(Partial::Array(items)) => self.attach(Value::Array(items)),
                _ => Err(EnrichError::Internal(
                    "array end without a matching array start".to_string(),
                )),
            },
            JsonEvent::MaterializedValue { .. } => Ok(Built::Pending),
        }
    }

    /// The value most recently attached to the innermost open container
    pub fn last_attached(&self) -> Option<&Value> {
        match self.stack.last()? {
            Partial::Object { map, key } => key.as_ref().and_then(|k| map.get(k)),
            Partial::Array(items) => items.last(),
        }
    }

    fn attach(&mut self, value: Value) -> Result<Built> {
        match self.stack.last_mut() {
            None => Ok(Built::Complete(value)),
            Some(Partial::Object { map, key }) => {
                let Some(name) = key.as_ref() else {
                    return Err(EnrichError::Internal(
                        "object member value without a key".to_string(),
                    ));
                };
                map.insert(name.clone(), value);
                Ok(Built::Attached)
            }
            Some(Partial::Array(items)) => {
                items.push(value);
                Ok(Built::Attached)
            }
        }
    }
}

/// Build one value from an event sequence
///
/// Events after the first complete value are not consumed.
pub fn build_value<I>(events: I) -> Result<Value>
where
    I: IntoIterator<Item = Result<JsonEvent>>,
{
    let mut builder = ValueBuilder::new();
    for event in events {
        if let Built::Complete(value) = builder.push(&event?)? {
            return Ok(value);
        }
    }
    Err(EnrichError::Internal(
        "event stream ended before the value was complete".to_string(),
    ))
}

/// Flatten a value into its event sequence, in document order
pub fn value_events(value: &Value) -> Vec<JsonEvent> {
    enum Walk<'a> {
        Object(serde_json::map::Iter<'a>),
        Array(std::slice::Iter<'a, Value>),
    }

    let mut out = Vec::new();
    let mut stack: Vec<Walk<'_>> = Vec::new();
    let mut next = Some(value);

    loop {
        if let Some(current) = next.take() {
            match current {
                Value::Object(map) => {
                    out.push(JsonEvent::ObjectStart);
                    stack.push(Walk::Object(map.iter()));
                }
                Value::Array(items) => {
                    out.push(JsonEvent::ArrayStart);
                    stack.push(Walk::Array(items.iter()));
                }
                scalar => out.push(JsonEvent::Scalar(scalar.clone())),
            }
        }

        match stack.last_mut() {
            None => break,
            Some(Walk::Object(members)) => match members.next() {
                Some((key, member)) => {
                    out.push(JsonEvent::Key(key.clone()));
                    next = Some(member);
                }
                None => {
                    stack.pop();
                    out.push(JsonEvent::ObjectEnd);
                }
            },
            Some(Walk::Array(items)) => match items.next() {
                Some(item) => next = Some(item),
                None => {
                    stack.pop();
                    out.push(JsonEvent::ArrayEnd);
                }
            },
        }
    }

    out
}
