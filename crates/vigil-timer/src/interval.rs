//! Recurring timer with start/stop control and overrun accounting.
//!
//! Late ticks never burst: whatever periods were missed (the task was
//! busy, the process was suspended, the laptop lid was closed...) are
//! dropped and the next tick is scheduled a full period after the late
//! one actually fired.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for an [`IntervalScheduler`].
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    /// Time between ticks.
    pub period: Duration,
    /// Random delay (0..=max) added to the *first* tick after each start,
    /// so that many clients started together do not hit the server in
    /// lockstep.
    pub initial_jitter: Duration,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            initial_jitter: Duration::ZERO,
        }
    }
}

impl IntervalConfig {
    /// Shortest period accepted; anything below is clamped.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    /// Create a config for a specific period with default settings.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`IntervalScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(
                period_ms = self.period.as_millis() as u64,
                min_ms = Self::MIN_PERIOD.as_millis() as u64,
                "interval period below minimum, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`IntervalScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1, survives restarts).
    pub tick: u64,
    /// How far past its scheduled time the tick actually fired.
    pub late_by: Duration,
    /// `true` if the tick fired more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods dropped because of the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// A recurring timer that is either running or stopped.
///
/// Created stopped. [`start`](Self::start) (re)schedules the first tick a
/// full period (plus jitter) from now, discarding any previous schedule,
/// so calling it twice never produces two timers.
pub struct IntervalScheduler {
    config: IntervalConfig,
    /// When the next tick should fire. `None` while stopped.
    next_tick: Option<Instant>,
    tick_count: u64,
}

impl IntervalScheduler {
    /// Create a stopped scheduler from config.
    pub fn new(config: IntervalConfig) -> Self {
        let config = config.validated();
        debug!(
            period_ms = config.period.as_millis() as u64,
            "interval scheduler created"
        );
        Self {
            config,
            next_tick: None,
            tick_count: 0,
        }
    }

    /// Create a stopped scheduler for a specific period with default settings.
    pub fn with_period(period: Duration) -> Self {
        Self::new(IntervalConfig::with_period(period))
    }

    /// Start (or restart) the timer.
    pub fn start(&mut self) {
        let jitter = if self.config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_us = self.config.initial_jitter.as_micros() as u64;
            Duration::from_micros(rand::rng().random_range(0..=max_us))
        };
        let restarted = self.next_tick.is_some();
        self.next_tick = Some(Instant::now() + self.config.period + jitter);
        debug!(
            period_ms = self.config.period.as_millis() as u64,
            jitter_ms = jitter.as_millis() as u64,
            restarted,
            "interval started"
        );
    }

    /// Stop the timer. `wait_for_tick` pends until the next `start`.
    ///
    /// Safe to call multiple times (idempotent).
    pub fn stop(&mut self) {
        if self.next_tick.take().is_some() {
            debug!(tick = self.tick_count, "interval stopped");
        }
    }

    /// Whether the timer is currently running.
    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Wait until the next tick is due.
    ///
    /// While stopped this future pends forever. Dropping it before it
    /// resolves leaves the schedule untouched, so it is safe to use as a
    /// `tokio::select!` branch.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(scheduled) = self.next_tick else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(scheduled).await;

        let now = Instant::now();
        let period = self.config.period;
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(scheduled);
        let overrun = late_by > period / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "interval overrun, skipping ahead"
            );
        }
        self.next_tick = Some(now + period);

        trace!(tick = self.tick_count, overrun, "interval tick");

        TickInfo {
            tick: self.tick_count,
            late_by,
            overrun,
            ticks_skipped,
        }
    }

    /// Number of ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.config.period
    }

    /// When the next tick is due, or `None` while stopped.
    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }
}
