//! Randomized inter-tick delay
//!
//! An open store sees customers anywhere from half a second to ten seconds
//! apart; a closed store ticks faster so the remaining customers drain out.

use crate::domain::types::StoreStatus;
use rand::{Rng, RngCore, SeedableRng};
use std::ops::Range;
use std::time::Duration;
use tokio::sync::watch;

/// Delay range (ms) while the store is open
pub const OPEN_DELAY_MS: Range<u64> = 500..10_000;

/// Delay range (ms) while the store is closed
pub const CLOSED_DELAY_MS: Range<u64> = 500..3_000;

pub struct DelayScheduler {
    open_ms: Range<u64>,
    closed_ms: Range<u64>,
    rng: Box<dyn RngCore + Send>,
}

impl Default for DelayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayScheduler {
    pub fn new() -> Self {
        Self::with_ranges(OPEN_DELAY_MS, CLOSED_DELAY_MS)
    }

    /// Scheduler with custom ranges, mostly so tests don't sleep for seconds
    ///
    /// Empty ranges collapse to their start value.
    pub fn with_ranges(open_ms: Range<u64>, closed_ms: Range<u64>) -> Self {
        Self { open_ms, closed_ms, rng: Box::new(rand::rngs::StdRng::from_entropy()) }
    }

    pub fn next_delay(&mut self, status: StoreStatus) -> Duration {
        let range = match status {
            StoreStatus::Open => self.open_ms.clone(),
            StoreStatus::Closed => self.closed_ms.clone(),
        };
        let ms = if range.is_empty() { range.start } else { self.rng.gen_range(range) };
        Duration::from_millis(ms)
    }

    /// Sleep for `delay` unless shutdown fires first
    ///
    /// Returns `true` if the full delay elapsed, `false` if cancelled.
    pub async fn wait(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = wait_for_shutdown(shutdown) => false,
        }
    }
}

/// Resolve once the shutdown flag is set (or its sender is gone)
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender dropped without signalling; nobody can cancel us any more
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ranges_by_status() {
        let mut scheduler = DelayScheduler::new();
        for _ in 0..1000 {
            let open = scheduler.next_delay(StoreStatus::Open);
            assert!(open >= Duration::from_millis(500) && open < Duration::from_millis(10_000));

            let closed = scheduler.next_delay(StoreStatus::Closed);
            assert!(closed >= Duration::from_millis(500) && closed < Duration::from_millis(3_000));
        }
    }

    #[test]
    fn test_empty_range_uses_start() {
        let mut scheduler = DelayScheduler::with_ranges(5..5, 0..0);
        assert_eq!(scheduler.next_delay(StoreStatus::Open), Duration::from_millis(5));
        assert_eq!(scheduler.next_delay(StoreStatus::Closed), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_elapses_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(DelayScheduler::wait(Duration::from_millis(5), &mut rx).await);
    }

    #[tokio::test]
    async fn test_wait_returns_early_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });

        let started = std::time::Instant::now();
        assert!(!DelayScheduler::wait(Duration::from_secs(30), &mut rx).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_wait_already_cancelled() {
        let (_tx, mut rx) = watch::channel(true);
        assert!(!DelayScheduler::wait(Duration::from_secs(30), &mut rx).await);
    }
}
