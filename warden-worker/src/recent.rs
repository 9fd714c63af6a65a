//! Bounded log of recent failures for status replies

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;

pub const DEFAULT_RECENT_ERRORS: usize = 10;

#[derive(Debug)]
pub struct RecentErrors {
    capacity: usize,
    entries: Mutex<VecDeque<String>>,
}

impl RecentErrors {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Record a failure, prefixed with the current time
    pub fn push(&self, message: impl AsRef<str>) {
        let entry = format!("{} {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), message.as_ref());
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent first
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for RecentErrors {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_ERRORS)
    }
}
