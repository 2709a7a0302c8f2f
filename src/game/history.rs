//! Recent announcements shown under the current move.

use crate::game::turn::Announcement;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// How many previous moves stay visible.
pub const HISTORY_LEN: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub announcement: Announcement,
    pub announced_at: DateTime<Utc>,
}

/// Bounded list of previous announcements, newest first.
#[derive(Debug, Clone)]
pub struct MoveHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for MoveHistory {
    fn default() -> Self {
        Self::new(HISTORY_LEN)
    }
}

impl MoveHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
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
}
