//! Inter-probe rate gate.
//!
//! Discovery awaits [`Throttle::ready`] before every probe. The production
//! gate enforces a minimum interval between consecutive grants using tokio's
//! clock, so tests can drive it with a paused runtime instead of sleeping.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[async_trait]
pub trait Throttle: Send + Sync {
    /// Resolves once the caller may issue its next request.
    async fn ready(&self);
}

/// Grants at most one request per `interval`. The first grant is immediate.
pub struct IntervalGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl IntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

#[async_trait]
impl Throttle for IntervalGate {
    async fn ready(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + self.interval).await;
        }
        *last = Some(Instant::now());
    }
}

/// No-op gate.
pub struct Unthrottled;

#[async_trait]
impl Throttle for Unthrottled {
    async fn ready(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interval_gate_spaces_grants() {
        let gate = IntervalGate::from_millis(100);
        let start = Instant::now();

        gate.ready().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        gate.ready().await;
        gate.ready().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_already_elapsed() {
        let gate = IntervalGate::from_millis(100);
        gate.ready().await;
        tokio::time::advance(Duration::from_millis(250)).await;

        let before = Instant::now();
        gate.ready().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
