//! Bounded query history.

use std::collections::VecDeque;

use crate::models::QueryRecord;

/// Default number of records kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Ring buffer of the most recent [`QueryRecord`]s, oldest first.
///
/// Duplicates are kept; when full, the oldest record is evicted.
#[derive(Debug, Clone)]
pub struct QueryHistory {
    capacity: usize,
    records: VecDeque<QueryRecord>,
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl QueryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: QueryRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the retained records, oldest first.
    pub fn snapshot(&self) -> Vec<QueryRecord> {
        self.records.iter().cloned().collect()
    }
}
