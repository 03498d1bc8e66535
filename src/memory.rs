//! Sliding window of recent question/answer exchanges.

use std::collections::VecDeque;

/// Number of exchanges remembered unless configured otherwise.
pub const DEFAULT_MEMORY_WINDOW: usize = 10;

/// One completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// User question.
    pub question: String,
    /// Assistant answer.
    pub answer: String,
}

/// Bounded ring buffer; the oldest exchange is evicted once full.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    capacity: usize,
    exchanges: VecDeque<Exchange>,
}

impl ConversationMemory {
    /// A window of `capacity` exchanges. A zero capacity remembers nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            exchanges: VecDeque::with_capacity(capacity),
        }
    }

    /// Maximum exchanges kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Exchanges currently held.
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// True when nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Records an exchange, evicting the oldest when over capacity.
    pub fn record(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.exchanges.len() >= self.capacity {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            question: question.into(),
            answer: answer.into(),
        });
    }

    /// Oldest first.
    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    /// History as `Human:`/`Assistant:` lines for prompt rendering.
    pub fn render(&self) -> String {
        self.exchanges
            .iter()
            .map(|exchange| format!("Human: {}\nAssistant: {}", exchange.question, exchange.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_WINDOW)
    }
}
