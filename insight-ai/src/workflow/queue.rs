//! In-memory job queue
//!
//! Deduplicated FIFO of `(record_id, analyzer_type)` entries. Not persisted:
//! record status is the durable truth and the recovery scan rebuilds the queue
//! at startup.

use std::collections::{HashSet, VecDeque};

use crate::models::AnalyzerType;

/// Queue depth above which each enqueue logs a warning
pub const DEFAULT_WARNING_DEPTH: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueEntry {
    pub record_id: String,
    pub analyzer: AnalyzerType,
}

impl QueueEntry {
    pub fn new(record_id: impl Into<String>, analyzer: AnalyzerType) -> Self {
        Self {
            record_id: record_id.into(),
            analyzer,
        }
    }
}

#[derive(Debug)]
pub struct JobQueue {
    entries: VecDeque<QueueEntry>,
    index: HashSet<QueueEntry>,
    warning_depth: usize,
}

impl JobQueue {
    pub fn new(warning_depth: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            index: HashSet::new(),
            warning_depth,
        }
    }

    /// Append unless an identical entry is already queued
    ///
    /// Returns `false` for a duplicate (no-op).
    pub fn enqueue(&mut self, record_id: impl Into<String>, analyzer: AnalyzerType) -> bool {
        let entry = QueueEntry::new(record_id, analyzer);
        if self.index.contains(&entry) {
            tracing::trace!(record_id = %entry.record_id, analyzer = %analyzer, "Already queued");
            return false;
        }

        self.index.insert(entry.clone());
        self.entries.push_back(entry);

        if self.entries.len() > self.warning_depth {
            tracing::warn!(
                depth = self.entries.len(),
                warning_depth = self.warning_depth,
                "Job queue depth above warning threshold"
            );
        }
        true
    }

    /// Oldest entry
    pub fn dequeue_next(&mut self) -> Option<QueueEntry> {
        let entry = self.entries.pop_front()?;
        self.index.remove(&entry);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued under any analyzer type
    pub fn contains(&self, record_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.record_id == record_id)
    }

    pub fn contains_entry(&self, record_id: &str, analyzer: AnalyzerType) -> bool {
        self.index.contains(&QueueEntry::new(record_id, analyzer))
    }

    pub fn warning_depth(&self) -> usize {
        self.warning_depth
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(DEFAULT_WARNING_DEPTH)
    }
}
