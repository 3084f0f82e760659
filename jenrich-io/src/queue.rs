//! Ordered replacement values consumed front-to-back

use serde_json::Value;
use std::collections::VecDeque;

/// Finite FIFO of replacement values with a consumption counter
#[derive(Debug, Clone, Default)]
pub struct ReplacementQueue {
    items: VecDeque<Value>,
    consumed: usize,
}

impl ReplacementQueue {
    /// Queue holding `values` in order
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            items: values.into(),
            consumed: 0,
        }
    }

    /// Take the next value
    pub fn pop(&mut self) -> Option<Value> {
        let value = self.items.pop_front()?;
        self.consumed += 1;
        Some(value)
    }

    /// Values taken so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Values still waiting
    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    /// True when every value has been taken
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<Value>> for ReplacementQueue {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl FromIterator<Value> for ReplacementQueue {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pops_in_order_and_counts() {
        let mut queue: ReplacementQueue = vec![json!("u1"), json!("u2")].into();
        assert_eq!(queue.remaining(), 2);
        assert_eq!(queue.pop(), Some(json!("u1")));
        assert_eq!(queue.consumed(), 1);
        assert_eq!(queue.pop(), Some(json!("u2")));
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.consumed(), 2);
    }
}
