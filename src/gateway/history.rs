//! Bounded per-connection conversation history.

use std::collections::VecDeque;

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub latency_ms: u64,
}

/// FIFO buffer of the most recent turns, used only to build generation
/// context. Connection-scoped and never persisted; a reconnect starts empty.
#[derive(Debug)]
pub struct HistoryWindow {
    turns: VecDeque<ChatTurn>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a turn, evicting the oldest once past capacity.
    pub fn push(&mut self, turn: ChatTurn) {
        if self.capacity == 0 {
            return;
        }
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Chronological `User:`/`Assistant:` transcript for the prompt.
    pub fn formatted(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            out.push_str(&format!(
                "User: {}\nAssistant: {}\n\n",
                turn.question, turn.answer
            ));
        }
        out
    }
}
