//! Bounded per-session message cache
//!
//! Keeps the most recent agent messages in arrival order. When full, the
//! oldest entry is evicted (FIFO).

use crate::bridge::protocol::AgentMessage;
use std::collections::VecDeque;

/// Default capacity for a session's message cache.
pub const DEFAULT_CAPACITY: usize = 200;

/// A capacity-limited FIFO of agent messages.
#[derive(Debug, Clone)]
pub struct MessageCache {
    /// front = oldest, back = newest
    entries: VecDeque<AgentMessage>,
    capacity: usize,
}

impl MessageCache {
    /// Create a cache holding at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Create a cache with the default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Append a message, evicting from the front if at capacity.
    /// Returns the evicted message, if any.
    pub fn push(&mut self, message: AgentMessage) -> Option<AgentMessage> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(message);
        evicted
    }

    /// Owned copy of the cached messages, oldest first.
    pub fn snapshot(&self) -> Vec<AgentMessage> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
