//! Event types for the Insight event system
//!
//! Provides the analysis lifecycle events and the EventBus that carries them.
//! A collaborator layer (e.g. an SSE endpoint) subscribes to the bus; the
//! pipeline never blocks on subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Analysis lifecycle events
///
/// Events are broadcast via EventBus and can be serialized for transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InsightEvent {
    /// Record accepted into the job queue
    AnalysisQueued {
        record_id: String,
        analyzer: String,
        /// Queue depth after the enqueue
        queue_len: usize,
        timestamp: DateTime<Utc>,
    },

    /// Record transitioned to `analyzing`
    AnalysisStarted {
        record_id: String,
        analyzer: String,
        timestamp: DateTime<Utc>,
    },

    /// Record reached `completed` with an insight
    AnalysisCompleted {
        record_id: String,
        analyzer: String,
        /// Evidence points used to build the prompt
        evidence_points: usize,
        timestamp: DateTime<Utc>,
    },

    /// Analyzer declined to run: not enough evidence yet
    ///
    /// Distinct from `AnalysisFailed` so clients can decide to collect more
    /// input rather than retry.
    AnalysisInsufficientData {
        record_id: String,
        analyzer: String,
        required: usize,
        available: usize,
        timestamp: DateTime<Utc>,
    },

    /// Record reached `failed`
    AnalysisFailed {
        record_id: String,
        analyzer: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Startup recovery scan finished
    RecoveryCompleted {
        scanned: usize,
        demoted: usize,
        enqueued: usize,
        timestamp: DateTime<Utc>,
    },
}

impl InsightEvent {
    /// Record id this event refers to, if any
    pub fn record_id(&self) -> Option<&str> {
        match self {
            InsightEvent::AnalysisQueued { record_id, .. }
            | InsightEvent::AnalysisStarted { record_id, .. }
            | InsightEvent::AnalysisCompleted { record_id, .. }
            | InsightEvent::AnalysisInsufficientData { record_id, .. }
            | InsightEvent::AnalysisFailed { record_id, .. } => Some(record_id),
            InsightEvent::RecoveryCompleted { .. } => None,
        }
    }
}

/// Broadcast bus for InsightEvent
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<InsightEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow subscribers
    /// start losing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<InsightEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: InsightEvent,
    ) -> Result<usize, broadcast::error::SendError<InsightEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: InsightEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
