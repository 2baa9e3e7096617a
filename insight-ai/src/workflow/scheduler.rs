//! Analysis worker loop
//!
//! The scheduler owns the job queue and the in-flight flag. Each tick moves at
//! most one record through `pending -> analyzing -> completed | failed`; a
//! failure is contained to its record and never stops the loop.

use async_trait::async_trait;
use chrono::Duration;
use insight_common::events::{EventBus, InsightEvent};
use insight_common::{Clock, Error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::queue::{JobQueue, QueueEntry, DEFAULT_WARNING_DEPTH};
use super::recovery::{self, RecoveryReport, DEFAULT_STALE_THRESHOLD_MINUTES};
use super::ticker::PeriodicTask;
use super::lock_queue;
use crate::analyzers::{AnalysisContext, AnalyzerRegistry};
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{
    AnalysisOutcome, AnalysisReport, AnalyzableRecord, AnalyzerType, RecordStatus, RecordUpdate,
};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// `analyzing` older than this is presumed abandoned
    pub stale_threshold: Duration,
    pub queue_warning_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::minutes(DEFAULT_STALE_THRESHOLD_MINUTES),
            queue_warning_depth: DEFAULT_WARNING_DEPTH,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick is still processing; queue untouched
    Busy,
    /// Queue empty
    Idle,
    /// Record no longer exists
    Dropped { record_id: String },
    /// Already completed, or claimed by a live worker
    Skipped {
        record_id: String,
        status: RecordStatus,
    },
    Completed {
        record_id: String,
        analyzer: AnalyzerType,
    },
    /// Completed with an insufficient-data envelope
    InsufficientData {
        record_id: String,
        analyzer: AnalyzerType,
    },
    Failed {
        record_id: String,
        analyzer: AnalyzerType,
        error: String,
    },
    /// Store read or write failed; record left as-is for the next recovery scan
    Aborted { record_id: String, error: String },
}

/// Clears the in-flight flag on every exit path
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    store: Arc<dyn RecordStore>,
    context: AnalysisContext,
    registry: AnalyzerRegistry,
    clock: Arc<dyn Clock>,
    events: EventBus,
    queue: Mutex<JobQueue>,
    in_flight: AtomicBool,
    stale_threshold: Duration,
}

impl Scheduler {
    pub fn new(
        context: AnalysisContext,
        registry: AnalyzerRegistry,
        clock: Arc<dyn Clock>,
        events: EventBus,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store: Arc::clone(&context.store),
            context,
            registry,
            clock,
            events,
            queue: Mutex::new(JobQueue::new(config.queue_warning_depth)),
            in_flight: AtomicBool::new(false),
            stale_threshold: config.stale_threshold,
        }
    }

    /// Queue a record for analysis; `false` if the entry is already queued
    ///
    /// The caller must already have created the record.
    pub fn enqueue(&self, record_id: &str, analyzer: AnalyzerType) -> bool {
        let (added, queue_len) = {
            let mut queue = lock_queue(&self.queue);
            (queue.enqueue(record_id, analyzer), queue.len())
        };

        if added {
            tracing::debug!(record_id, analyzer = %analyzer, queue_len, "Analysis queued");
            self.events.emit_lossy(InsightEvent::AnalysisQueued {
                record_id: record_id.to_string(),
                analyzer: analyzer.to_string(),
                queue_len,
                timestamp: self.clock.now(),
            });
        }
        added
    }

    /// Startup reconciliation of persisted non-terminal records
    pub async fn recover(&self) -> RecoveryReport {
        let report = recovery::recover(
            self.store.as_ref(),
            &self.queue,
            self.clock.as_ref(),
            self.stale_threshold,
        )
        .await;

        self.events.emit_lossy(InsightEvent::RecoveryCompleted {
            scanned: report.scanned,
            demoted: report.demoted,
            enqueued: report.enqueued,
            timestamp: self.clock.now(),
        });
        report
    }

    /// Operator action: put a `failed` record back to `pending` and queue it
    pub async fn retry_failed(&self, record_id: &str, analyzer: AnalyzerType) -> insight_common::Result<()> {
        let record = self
            .store
            .find_by_id(record_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("record {}", record_id)))?;

        if record.status != RecordStatus::Failed {
            return Err(Error::InvalidInput(format!(
                "record {} is {}, only failed records can be retried",
                record_id, record.status
            )));
        }

        if !self
            .store
            .update(record_id, &RecordUpdate::pending(self.clock.now()))
            .await?
        {
            return Err(Error::NotFound(format!("record {}", record_id)));
        }

        tracing::info!(record_id, analyzer = %analyzer, "Retrying failed record");
        self.enqueue(record_id, analyzer);
        Ok(())
    }

    /// Process at most one queued entry
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::trace!("Analysis in flight, skipping tick");
            return TickOutcome::Busy;
        };

        let Some(entry) = self.next_entry() else {
            tracing::trace!("Job queue empty");
            return TickOutcome::Idle;
        };

        self.process(entry).await
    }

    pub fn queue_len(&self) -> usize {
        lock_queue(&self.queue).len()
    }

    pub fn is_queued(&self, record_id: &str, analyzer: AnalyzerType) -> bool {
        lock_queue(&self.queue).contains_entry(record_id, analyzer)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn next_entry(&self) -> Option<QueueEntry> {
        lock_queue(&self.queue).dequeue_next()
    }

    async fn process(&self, entry: QueueEntry) -> TickOutcome {
        let QueueEntry { record_id, analyzer } = entry;

        let record = match self.store.find_by_id(&record_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(record_id = %record_id, analyzer = %analyzer, "RECORD_MISSING: dropping queue entry");
                return TickOutcome::Dropped { record_id };
            }
            Err(e) => {
                tracing::error!(record_id = %record_id, error = %e, "Failed to load record");
                return TickOutcome::Aborted {
                    record_id,
                    error: e.to_string(),
                };
            }
        };

        let now = self.clock.now();
        match record.status {
            RecordStatus::Completed => {
                tracing::debug!(record_id = %record_id, "Already completed, skipping");
                return TickOutcome::Skipped {
                    record_id,
                    status: record.status,
                };
            }
            RecordStatus::Analyzing if !record.is_stale(now, self.stale_threshold) => {
                tracing::info!(record_id = %record_id, "Record claimed by an active worker, skipping");
                return TickOutcome::Skipped {
                    record_id,
                    status: record.status,
                };
            }
            RecordStatus::Analyzing => {
                tracing::info!(
                    record_id = %record_id,
                    stale_since = %record.updated_at,
                    "Reclaiming stale analyzing record"
                );
            }
            RecordStatus::Failed => {
                tracing::info!(record_id = %record_id, "Reprocessing failed record");
            }
            RecordStatus::Pending => {}
        }

        let claim = RecordUpdate::analyzing(now);
        match self.store.update(&record_id, &claim).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(record_id = %record_id, "RECORD_MISSING: record deleted before claim");
                return TickOutcome::Dropped { record_id };
            }
            Err(e) => {
                let error = AnalysisError::StoreWrite(e.to_string());
                tracing::error!(record_id = %record_id, error = %error, "Failed to claim record");
                return TickOutcome::Aborted {
                    record_id,
                    error: error.to_string(),
                };
            }
        }

        let mut record = record;
        claim.apply_to(&mut record);

        tracing::info!(record_id = %record_id, analyzer = %analyzer, "Analysis started");
        self.events.emit_lossy(InsightEvent::AnalysisStarted {
            record_id: record_id.clone(),
            analyzer: analyzer.to_string(),
            timestamp: now,
        });

        let start = Instant::now();
        let result = self.run_analyzer(analyzer, &record).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok((outcome, envelope)) => {
                self.persist_success(record_id, analyzer, outcome, envelope, elapsed_ms)
                    .await
            }
            Err(error) => self.persist_failure(record_id, analyzer, error, elapsed_ms).await,
        }
    }

    async fn run_analyzer(
        &self,
        analyzer: AnalyzerType,
        record: &AnalyzableRecord,
    ) -> AnalysisResult<(AnalysisOutcome, serde_json::Value)> {
        let runner = self
            .registry
            .get(analyzer)
            .ok_or(AnalysisError::UnsupportedAnalyzer(analyzer))?;

        let outcome = runner.analyze(&self.context, record).await?;
        let report = AnalysisReport::new(analyzer, outcome.clone(), self.clock.now());
        Ok((outcome, serde_json::to_value(&report)?))
    }

    async fn persist_success(
        &self,
        record_id: String,
        analyzer: AnalyzerType,
        outcome: AnalysisOutcome,
        envelope: serde_json::Value,
        elapsed_ms: u64,
    ) -> TickOutcome {
        let now = self.clock.now();
        match self
            .store
            .update(&record_id, &RecordUpdate::completed(envelope, now))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(record_id = %record_id, "RECORD_MISSING: record deleted during analysis");
                return TickOutcome::Dropped { record_id };
            }
            Err(e) => {
                tracing::error!(
                    record_id = %record_id,
                    error = %e,
                    "STORE_WRITE_FAILURE: result not persisted, record stays analyzing"
                );
                return TickOutcome::Aborted {
                    record_id,
                    error: AnalysisError::StoreWrite(e.to_string()).to_string(),
                };
            }
        }

        match outcome {
            AnalysisOutcome::Insight {
                evidence_points,
                low_evidence,
                ..
            } => {
                tracing::info!(
                    record_id = %record_id,
                    analyzer = %analyzer,
                    evidence_points,
                    low_evidence,
                    elapsed_ms,
                    "Analysis completed"
                );
                self.events.emit_lossy(InsightEvent::AnalysisCompleted {
                    record_id: record_id.clone(),
                    analyzer: analyzer.to_string(),
                    evidence_points,
                    timestamp: now,
                });
                TickOutcome::Completed { record_id, analyzer }
            }
            AnalysisOutcome::InsufficientData {
                required, available, ..
            } => {
                tracing::info!(
                    record_id = %record_id,
                    analyzer = %analyzer,
                    required,
                    available,
                    "Analysis completed with insufficient data"
                );
                self.events.emit_lossy(InsightEvent::AnalysisInsufficientData {
                    record_id: record_id.clone(),
                    analyzer: analyzer.to_string(),
                    required,
                    available,
                    timestamp: now,
                });
                TickOutcome::InsufficientData { record_id, analyzer }
            }
        }
    }

    async fn persist_failure(
        &self,
        record_id: String,
        analyzer: AnalyzerType,
        error: AnalysisError,
        elapsed_ms: u64,
    ) -> TickOutcome {
        let message = error.to_string();
        tracing::error!(
            record_id = %record_id,
            analyzer = %analyzer,
            code = error.code(),
            error = %message,
            elapsed_ms,
            "Analysis failed"
        );

        let now = self.clock.now();
        match self
            .store
            .update(&record_id, &RecordUpdate::failed(message.clone(), now))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(record_id = %record_id, "RECORD_MISSING: record deleted during analysis");
                return TickOutcome::Dropped { record_id };
            }
            Err(e) => {
                tracing::error!(
                    record_id = %record_id,
                    error = %e,
                    "STORE_WRITE_FAILURE: failure not persisted, record stays analyzing"
                );
                return TickOutcome::Aborted {
                    record_id,
                    error: AnalysisError::StoreWrite(e.to_string()).to_string(),
                };
            }
        }

        self.events.emit_lossy(InsightEvent::AnalysisFailed {
            record_id: record_id.clone(),
            analyzer: analyzer.to_string(),
            error: message.clone(),
            timestamp: now,
        });

        TickOutcome::Failed {
            record_id,
            analyzer,
            error: message,
        }
    }
}

#[async_trait]
impl PeriodicTask for Scheduler {
    fn name(&self) -> &str {
        "analysis-worker"
    }

    async fn tick(&self) {
        match Scheduler::tick(self).await {
            TickOutcome::Idle | TickOutcome::Busy => {}
            outcome => tracing::debug!(?outcome, "Worker tick finished"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        {
            let guard = InFlightGuard::acquire(&flag);
            assert!(guard.is_some());
            assert!(InFlightGuard::acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::SeqCst));
        assert!(InFlightGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.stale_threshold, Duration::minutes(30));
        assert_eq!(config.queue_warning_depth, 500);
    }
}
