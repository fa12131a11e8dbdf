// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Time source for settle delays, readiness polling and log freshness.
//!
//! Every wait in the crate goes through a [`Clock`] so tests can swap in a
//! [`ManualClock`] and simulate minutes of waiting instantly.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time, used for deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for timestamps and file modification ages.
    fn wall(&self) -> SystemTime;

    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when slept on or advanced explicitly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: SystemTime,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: SystemTime::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += duration;
    }

    /// Total simulated time since creation.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall(&self) -> SystemTime {
        self.wall_origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Let other tasks observe the new time, as a real sleep would.
        tokio::task::yield_now().await;
    }
}

/// Sleep for `duration` unless `cancel` fires first.
/// Returns `false` when the wait was cut short by cancellation.
pub async fn sleep_or_cancel(
    clock: &dyn Clock,
    cancel: &CancellationToken,
    duration: Duration,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = clock.sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_both_clocks() {
        let clock = ManualClock::new();
        let start = clock.now();
        let wall_start = clock.wall();

        clock.sleep(Duration::from_secs(30)).await;

        assert_eq!(clock.now() - start, Duration::from_secs(30));
        assert_eq!(
            clock.wall().duration_since(wall_start).unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_completes() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(&clock, &cancel, Duration::from_secs(2)).await);
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_already_cancelled() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!sleep_or_cancel(&clock, &cancel, Duration::from_secs(2)).await);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_interrupts_real_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let completed = sleep_or_cancel(&TokioClock, &cancel, Duration::from_secs(60)).await;
        assert!(!completed);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
