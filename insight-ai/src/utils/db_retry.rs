//! Lock-contention retry for record store writes
//!
//! SQLite reports `database is locked` when another connection holds the
//! write lock. Status transitions ride that out with a doubling backoff
//! bounded by `store_max_lock_wait_ms`; anything else surfaces at once.

use insight_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

const FIRST_PAUSE_MS: u64 = 10;
const LONGEST_PAUSE_MS: u64 = 1000;
/// Recovered writes slower than this are worth a warning
const SLOW_WRITE_MS: u128 = 2000;

/// Doubling pause schedule with a wall-clock budget
#[derive(Debug)]
struct LockBackoff {
    started: Instant,
    budget: Duration,
    next_pause_ms: u64,
    attempts: u32,
}

impl LockBackoff {
    fn new(budget_ms: u64) -> Self {
        Self {
            started: Instant::now(),
            budget: Duration::from_millis(budget_ms),
            next_pause_ms: FIRST_PAUSE_MS,
            attempts: 0,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Next pause, or `None` once the budget is spent
    fn pause(&mut self) -> Option<Duration> {
        if self.elapsed() >= self.budget {
            return None;
        }
        let pause = Duration::from_millis(self.next_pause_ms);
        self.next_pause_ms = (self.next_pause_ms * 2).min(LONGEST_PAUSE_MS);
        Some(pause)
    }
}

/// Run `write` until it stops failing with a lock error or `max_wait_ms` is spent.
///
/// Errors other than lock contention are returned on the first attempt.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut write: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = LockBackoff::new(max_wait_ms);

    loop {
        backoff.attempts += 1;
        let err = match write().await {
            Ok(value) => {
                if backoff.attempts > 1 {
                    let waited_ms = backoff.elapsed().as_millis();
                    if waited_ms > SLOW_WRITE_MS {
                        tracing::warn!(
                            operation = operation_name,
                            attempts = backoff.attempts,
                            waited_ms,
                            "Store write went through after a long lock wait"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempts = backoff.attempts,
                            waited_ms,
                            "Store write went through after lock wait"
                        );
                    }
                }
                return Ok(value);
            }
            Err(err) if err.is_database_locked() => err,
            Err(err) => return Err(err),
        };

        let Some(pause) = backoff.pause() else {
            let waited_ms = backoff.elapsed().as_millis();
            tracing::error!(
                operation = operation_name,
                attempts = backoff.attempts,
                waited_ms,
                max_wait_ms,
                error = %err,
                "Store stayed locked past the wait budget"
            );
            return Err(Error::Internal(format!(
                "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                backoff.attempts, waited_ms, max_wait_ms
            )));
        };

        tracing::warn!(
            operation = operation_name,
            attempt = backoff.attempts,
            pause_ms = pause.as_millis(),
            "Store locked, pausing before next attempt"
        );
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn locked() -> Error {
        Error::Database(sqlx::Error::Protocol("database is locked".to_string()))
    }

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let mut backoff = LockBackoff::new(60_000);
        let pauses: Vec<u64> = (0..9)
            .map(|_| backoff.pause().unwrap().as_millis() as u64)
            .collect();
        assert_eq!(pauses, vec![10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }

    #[test]
    fn test_zero_budget_never_pauses() {
        assert!(LockBackoff::new(0).pause().is_none());
    }

    #[tokio::test]
    async fn test_write_recovers_after_lock_contention() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("update_record_status", 5000, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(locked())
                } else {
                    Ok("written")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "written");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_lock_outlasting_budget_is_reported() {
        let result = retry_on_lock("insert_record", 50, || async { Err::<(), Error>(locked()) }).await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Internal(ref msg) if msg.contains("Database locked")));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("insert_record", 5000, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), Error>(Error::Database(sqlx::Error::RowNotFound)) }
        })
        .await;

        assert!(matches!(result, Err(Error::Database(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
