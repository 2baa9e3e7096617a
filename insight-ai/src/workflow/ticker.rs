//! Periodic task driver
//!
//! Production code runs a [`PeriodicTask`] on a fixed interval until the
//! cancellation token fires; tests call `tick()` directly.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Shortest interval accepted by [`run_periodic`]
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &str;

    async fn tick(&self);
}

/// Tick `task` every `interval` until `cancel` fires
///
/// The first tick runs immediately. A tick that overruns the interval delays
/// the next one rather than triggering a burst. Cancellation is only observed
/// between ticks. A zero interval is raised to [`MIN_INTERVAL`].
pub async fn run_periodic(task: Arc<dyn PeriodicTask>, interval: Duration, cancel: CancellationToken) {
    if interval < MIN_INTERVAL {
        tracing::warn!(
            task = task.name(),
            interval_ms = interval.as_millis() as u64,
            "Periodic interval too short, clamping"
        );
    }
    let interval = interval.max(MIN_INTERVAL);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        task = task.name(),
        interval_ms = interval.as_millis() as u64,
        "Periodic task started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => task.tick().await,
        }
    }

    tracing::info!(task = task.name(), "Periodic task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn tick(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_cancelled() {
        let counter = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_periodic(
            counter.clone(),
            Duration::from_millis(3000),
            cancel.clone(),
        ));

        // Immediate tick plus ticks at 3s and 6s
        tokio::time::sleep(Duration::from_millis(7000)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(counter.ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let counter = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_periodic(counter.clone(), Duration::ZERO, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(counter.ticks.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_never_ticks() {
        let counter = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        run_periodic(counter.clone(), Duration::from_millis(10), cancel).await;

        assert_eq!(counter.ticks.load(Ordering::SeqCst), 0);
    }
}
