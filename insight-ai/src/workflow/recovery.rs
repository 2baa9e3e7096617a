//! Startup recovery scan
//!
//! Reconciles persisted non-terminal records with the (empty) in-memory queue.
//! Stale `analyzing` records are presumed abandoned by a crashed worker and
//! demoted to `pending`; younger ones are enqueued untouched and the worker's
//! own staleness check decides what happens to them.

use chrono::Duration;
use insight_common::Clock;
use serde::Serialize;
use std::sync::Mutex;

use super::queue::JobQueue;
use super::lock_queue;
use crate::models::{RecordStatus, RecordUpdate};
use crate::store::RecordStore;

/// Default age after which an `analyzing` record is presumed abandoned
pub const DEFAULT_STALE_THRESHOLD_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Non-terminal records found
    pub scanned: usize,
    /// Stale `analyzing` records reset to `pending`
    pub demoted: usize,
    /// Entries placed on the queue
    pub enqueued: usize,
    /// Records with no analyzer for their kind
    pub skipped: usize,
    /// Store errors encountered (scan continues past them)
    pub errors: usize,
}

/// Run the recovery scan; never fails
pub async fn recover(
    store: &dyn RecordStore,
    queue: &Mutex<JobQueue>,
    clock: &dyn Clock,
    stale_threshold: Duration,
) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    let records = match store
        .find_all_by_status(&[RecordStatus::Pending, RecordStatus::Analyzing])
        .await
    {
        Ok(records) => records,
        Err(e) => {
            tracing::error!(error = %e, "Recovery scan query failed");
            report.errors = 1;
            return report;
        }
    };

    let now = clock.now();
    report.scanned = records.len();

    for record in records {
        let Some(analyzer) = record.kind.analyzer_type() else {
            tracing::warn!(
                record_id = %record.id,
                kind = %record.kind,
                status = %record.status,
                "Non-terminal record has no analyzer, skipping"
            );
            report.skipped += 1;
            continue;
        };

        if record.is_stale(now, stale_threshold) {
            match store.update(&record.id, &RecordUpdate::pending(now)).await {
                Ok(true) => {
                    tracing::info!(
                        record_id = %record.id,
                        stale_since = %record.updated_at,
                        "Demoted stale analyzing record to pending"
                    );
                    report.demoted += 1;
                }
                Ok(false) => {
                    tracing::warn!(record_id = %record.id, "Record vanished during recovery");
                    continue;
                }
                Err(e) => {
                    // Still enqueued: the worker treats a stale lock as claimable
                    tracing::error!(
                        record_id = %record.id,
                        error = %e,
                        "STORE_WRITE_FAILURE: could not demote stale record"
                    );
                    report.errors += 1;
                }
            }
        }

        if lock_queue(queue).enqueue(record.id.as_str(), analyzer) {
            report.enqueued += 1;
        }
    }

    tracing::info!(
        scanned = report.scanned,
        demoted = report.demoted,
        enqueued = report.enqueued,
        skipped = report.skipped,
        errors = report.errors,
        "Recovery scan complete"
    );

    report
}
