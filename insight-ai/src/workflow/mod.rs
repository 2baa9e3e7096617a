//! Job processing: queue, recovery scan, worker loop, ticker

pub mod queue;
pub mod recovery;
pub mod scheduler;
pub mod ticker;

pub use queue::{JobQueue, QueueEntry};
pub use recovery::{recover, RecoveryReport};
pub use scheduler::{Scheduler, SchedulerConfig, TickOutcome};
pub use ticker::{run_periodic, PeriodicTask};

use std::sync::{Mutex, MutexGuard};

/// Lock the queue; a poisoned lock still holds a consistent queue
pub(crate) fn lock_queue(queue: &Mutex<JobQueue>) -> MutexGuard<'_, JobQueue> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
