//! # Conversation History Store
//!
//! Process-wide ordered record of prior conversation turns, bounded to a fixed
//! number of entries. When an append would exceed the cap, the oldest entries
//! are dropped until the cap is met, preserving the relative order of the
//! survivors.
//!
//! ## Thread Safety:
//! Uses Arc<Mutex<VecDeque>> so the store can be shared between session actors
//! and in-flight pipeline tasks. Appends only ever happen while the processing
//! guard is held, so they cannot race across sessions.

use crate::inference::{ChatMessage, Role};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Shared, bounded conversation history.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: Arc<Mutex<VecDeque<ChatMessage>>>,
    max_entries: usize,
}

impl ConversationHistory {
    /// Create a history bounded to `max_entries` turns.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(max_entries))),
            max_entries,
        }
    }

    /// Append a turn, trimming the oldest entries past the cap.
    pub fn push(&self, role: Role, content: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap();
        entries.push_back(ChatMessage::new(role, content));

        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Current ordered snapshot of all turns.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
