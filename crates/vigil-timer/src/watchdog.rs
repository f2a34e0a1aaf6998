//! One-shot, re-armable deadline timer.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::debug;

/// A deadline that fires once, unless re-armed or disarmed first.
///
/// ```text
///   Disarmed ──(arm)──→ Armed ──(deadline passes)──→ Disarmed (fired)
///       ↑                 │ ↑
///       └────(disarm)─────┘ └──(arm again: deadline replaced)
/// ```
///
/// Arming with a deadline that has already passed is allowed: the next
/// call to [`expired`](Self::expired) resolves immediately.
#[derive(Debug, Default)]
pub struct Watchdog {
    deadline: Option<Instant>,
    fired: u64,
}

impl Watchdog {
    /// Creates a disarmed watchdog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the watchdog for an absolute deadline.
    pub fn arm(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
        debug!(
            remaining_ms = deadline
                .saturating_duration_since(Instant::now())
                .as_millis() as u64,
            "watchdog armed"
        );
    }

    /// Arms (or re-arms) the watchdog to fire `after` from now.
    pub fn arm_after(&mut self, after: Duration) {
        self.arm(Instant::now() + after);
    }

    /// Disarms the watchdog. Idempotent.
    pub fn disarm(&mut self) {
        if self.deadline.take().is_some() {
            debug!("watchdog disarmed");
        }
    }

    /// Whether a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, or `None` if disarmed.
    /// Zero once the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// How many times the watchdog has fired.
    pub fn fired_count(&self) -> u64 {
        self.fired
    }

    /// Waits for the deadline, then disarms and returns it.
    ///
    /// Pends forever while disarmed. Dropping the future before it
    /// resolves leaves the watchdog armed.
    pub async fn expired(&mut self) -> Instant {
        let Some(deadline) = self.deadline else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(deadline).await;

        self.deadline = None;
        self.fired += 1;
        deadline
    }
}
