//! Bounded conversation history.
//!
//! One instance per active session. Capacity-bounded with FIFO eviction so
//! long demos never overflow the model's context window.

use std::collections::VecDeque;

/// Speaker role for a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
}

/// Ordered, size-bounded sequence of turns, oldest evicted first.
#[derive(Debug)]
pub struct ConversationHistory {
    entries: VecDeque<HistoryEntry>,
    cap: usize,
}

impl ConversationHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
        }
    }

    /// Append a whole turn, evicting the oldest entry at capacity.
    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.entries.push_back(HistoryEntry {
            role,
            text: text.into(),
        });
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    /// Append a streamed assistant fragment.
    ///
    /// The realtime transport emits partial transcript text, so deltas are
    /// coalesced into the trailing assistant entry; a new entry is only
    /// started when the tail is a user turn (or the history is empty).
    pub fn append_assistant_delta(&mut self, delta: &str) {
        match self.entries.back_mut() {
            Some(entry) if entry.role == Role::Assistant => entry.text.push_str(delta),
            _ => self.push(Role::Assistant, delta),
        }
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

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Render as role-tagged chat messages for an LLM request.
    pub fn to_messages(&self) -> Vec<serde_json::Value> {
        self.entries
            .iter()
            .map(|e| serde_json::json!({"role": e.role.as_str(), "content": e.text}))
            .collect()
    }
}
