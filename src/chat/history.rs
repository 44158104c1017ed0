//! Bounded conversation history.

use std::collections::VecDeque;

use crate::chat::exchange::ChatExchange;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Chronological log of exchanges; the oldest entry is evicted past capacity.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: VecDeque<ChatExchange>,
    capacity: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ConversationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn append(&mut self, exchange: ChatExchange) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(exchange);
    }

    /// The last `limit` exchanges, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<&ChatExchange> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).collect()
    }

    pub fn reset(&mut self) {
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
