//! Session timers for Vigil.
//!
//! Two primitives, both built on `tokio::time` so that tests can drive
//! them with a paused clock:
//!
//! - [`IntervalScheduler`]: a recurring timer that can be started,
//!   restarted and stopped. Drives periodic token refresh.
//! - [`Watchdog`]: a one-shot deadline that can be re-armed at any time.
//!   Drives inactivity logout.
//!
//! # Integration
//!
//! Both are designed to sit inside an actor's `tokio::select!` loop. When
//! stopped (or disarmed) their wait futures pend forever, so the other
//! branches keep running:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = ticker.wait_for_tick() => { /* refresh */ }
//!         _ = watchdog.expired() => { /* log out */ }
//!     }
//! }
//! ```

mod interval;
mod watchdog;

pub use interval::{IntervalConfig, IntervalScheduler, TickInfo};
pub use watchdog::Watchdog;
