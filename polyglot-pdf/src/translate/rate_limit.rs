//! Global provider rate gate.
//!
//! One lock-protected "next allowed time" cursor shared by all workers,
//! deliberately decoupled from the page-level concurrency bound: however
//! many pages are in flight, provider requests leave at most once per
//! interval.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{Instant, sleep};

pub struct RateGate {
    interval: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(min_interval_ms),
            next_allowed: Mutex::new(None),
        }
    }

    /// Wait until this caller's slot. Reserves the next slot before
    /// sleeping, so concurrent callers serialize without holding the lock
    /// across an await point.
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }

        let wait = {
            let mut next_allowed = self
                .next_allowed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            let slot = next_allowed.unwrap_or(now).max(now);
            *next_allowed = Some(slot + self.interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}
