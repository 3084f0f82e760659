//! Structural position tracking over an event stream
//!
//! Every resolver and transform owns one [`PathTracker`]; nothing here is
//! shared between passes.

use crate::error::{EnrichError, Result};
use crate::event::{JsonEvent, Trail, TrailStep};
use crate::path::StepRef;
use smallvec::SmallVec;

#[derive(Debug, Clone)]
enum Frame {
    Object { key: Option<String> },
    Array { next: usize },
}

/// What an event did to the tracked position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A scalar value began and ended; `steps()` is its location
    Scalar,
    /// A container was opened; `steps()` is the container's location
    ContainerStart,
    /// A container was closed; `steps()` is the container's location
    ContainerEnd,
    /// An object key was read; `steps()` is the location of the member value
    Key,
    /// The event carries no structure (materialized values)
    Annotation,
}

/// Explicit frame stack mirroring the nesting of the events seen so far
#[derive(Debug, Clone, Default)]
pub struct PathTracker {
    frames: SmallVec<[Frame; 16]>,
}

impl PathTracker {
    /// Tracker positioned before the document root
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open containers
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Advance the position by one event
    pub fn apply(&mut self, event: &JsonEvent) -> Result<Transition> {
        match event {
            JsonEvent::ObjectStart => {
                self.begin_value();
                self.frames.push(Frame::Object { key: None });
                Ok(Transition::ContainerStart)
            }
            JsonEvent::ArrayStart => {
                self.begin_value();
                self.frames.push(Frame::Array { next: 0 });
                Ok(Transition::ContainerStart)
            }
            JsonEvent::ObjectEnd => match self.frames.pop() {
                Some(Frame::Object { .. }) => Ok(Transition::ContainerEnd),
                other => Err(self.mismatch("object end", other)),
            },
            JsonEvent::ArrayEnd => match self.frames.pop() {
                Some(Frame::Array { .. }) => Ok(Transition::ContainerEnd),
                other => Err(self.mismatch("array end", other)),
            },
            JsonEvent::Key(name) => match self.frames.last_mut() {
                Some(Frame::Object { key }) => {
                    *key = Some(name.clone());
                    Ok(Transition::Key)
                }
                _ => Err(EnrichError::Internal(format!(
                    "key '{}' outside of an object",
                    name
                ))),
            },
            JsonEvent::Scalar(_) => {
                self.begin_value();
                Ok(Transition::Scalar)
            }
            JsonEvent::MaterializedValue { .. } => Ok(Transition::Annotation),
        }
    }

    /// Steps of the current location
    ///
    /// Freshly opened containers (no key read yet, no element begun) add no
    /// step, so right after `ContainerStart` this is the container's own
    /// location.
    pub fn steps(&self) -> impl Iterator<Item = StepRef<'_>> + Clone {
        self.frames.iter().filter_map(|frame| match frame {
            Frame::Object { key } => key.as_deref().map(StepRef::Key),
            Frame::Array { next } => next.checked_sub(1).map(StepRef::Index),
        })
    }

    /// Owned copy of the current location
    pub fn trail(&self) -> Trail {
        Trail::from(
            self.steps()
                .map(|step| match step {
                    StepRef::Key(key) => TrailStep::Key(key.to_string()),
                    StepRef::Index(index) => TrailStep::Index(index),
                })
                .collect::<Vec<_>>(),
        )
    }

    /// Elements begun so far in the innermost array, if the innermost
    /// container is an array
    pub fn array_len(&self) -> Option<usize> {
        match self.frames.last() {
            Some(Frame::Array { next }) => Some(*next),
            _ => None,
        }
    }

    fn begin_value(&mut self) {
        if let Some(Frame::Array { next }) = self.frames.last_mut() {
            *next += 1;
        }
    }

    fn mismatch(&self, event: &str, found: Option<Frame>) -> EnrichError {
        let open = match found {
            Some(Frame::Object { .. }) => "an object",
            Some(Frame::Array { .. }) => "an array",
            None => "no container",
        };
        EnrichError::Internal(format!("{} while {} is open", event, open))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(name: &str) -> JsonEvent {
        JsonEvent::Key(name.to_string())
    }

    #[test]
    fn tracks_object_and_array_locations() {
        let mut tracker = PathTracker::new();
        assert_eq!(
            tracker.apply(&JsonEvent::ObjectStart).unwrap(),
            Transition::ContainerStart
        );
        assert!(tracker.trail().is_empty());

        assert_eq!(tracker.apply(&key("a")).unwrap(), Transition::Key);
        assert_eq!(tracker.trail().to_string(), "$.a");

        tracker.apply(&JsonEvent::ArrayStart).unwrap();
        assert_eq!(tracker.trail().to_string(), "$.a");

        tracker.apply(&JsonEvent::Scalar(json!(1))).unwrap();
        assert_eq!(tracker.trail().to_string(), "$.a[0]");

        tracker.apply(&JsonEvent::ObjectStart).unwrap();
        assert_eq!(tracker.trail().to_string(), "$.a[1]");
        tracker.apply(&key("x")).unwrap();
        assert_eq!(tracker.trail().to_string(), "$.a[1].x");
        tracker.apply(&JsonEvent::Scalar(json!("v"))).unwrap();
        assert_eq!(
            tracker.apply(&JsonEvent::ObjectEnd).unwrap(),
            Transition::ContainerEnd
        );
        assert_eq!(tracker.trail().to_string(), "$.a[1]");
        assert_eq!(tracker.array_len(), Some(2));

        tracker.apply(&JsonEvent::ArrayEnd).unwrap();
        assert_eq!(tracker.trail().to_string(), "$.a");
        tracker.apply(&JsonEvent::ObjectEnd).unwrap();
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn rejects_mismatched_end() {
        let mut tracker = PathTracker::new();
        tracker.apply(&JsonEvent::ArrayStart).unwrap();
        assert!(matches!(
            tracker.apply(&JsonEvent::ObjectEnd),
            Err(EnrichError::Internal(_))
        ));
    }

    #[test]
    fn rejects_key_outside_object() {
        let mut tracker = PathTracker::new();
        tracker.apply(&JsonEvent::ArrayStart).unwrap();
        assert!(tracker.apply(&key("a")).is_err());
    }
}
