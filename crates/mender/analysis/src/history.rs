//! Bounded log of analysis interactions.

use std::collections::VecDeque;

use mender_types::{InteractionId, LlmInteraction};
use parking_lot::RwLock;

/// Default number of interactions returned by [`InteractionLog::recent`].
pub const DEFAULT_HISTORY_PAGE: usize = 50;

/// Append-only interaction history that keeps the newest `capacity` entries.
pub struct InteractionLog {
    entries: RwLock<VecDeque<LlmInteraction>>,
    capacity: usize,
}

impl InteractionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, interaction: LlmInteraction) {
        let mut entries = self.entries.write();
        entries.push_back(interaction);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Up to `limit` interactions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LlmInteraction> {
        self.entries.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn get(&self, id: &InteractionId) -> Option<LlmInteraction> {
        self.entries.read().iter().find(|i| &i.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for InteractionLog {
    fn default() -> Self {
        Self::new(500)
    }
}
