//! Client-side authentication session management for Vigil.
//!
//! This crate owns the lifecycle of a signed-in user on the client:
//!
//! 1. **State**: who is signed in, whether a check is in flight, the last
//!    error ([`SessionState`], changed only through [`SessionAction`]s)
//! 2. **Refresh**: renewing the token on a fixed interval, with
//!    concurrent refreshes collapsed into one call ([`RefreshCoordinator`])
//! 3. **Inactivity**: logging out a session nobody has touched for a
//!    while ([`ActivityKind`], [`ActivityListener`])
//!
//! [`SessionManager`] ties the three together: it exposes the operations
//! (login, register, logout...) and runs the timers on a background task
//! between [`start`](SessionManager::start) and
//! [`stop`](SessionManager::stop).
//!
//! # How it fits in the stack
//!
//! ```text
//! UI bindings (above)  ← subscribe to state, call operations, feed activity
//!     ↕
//! Session Layer (this crate)  ← state machine, timers, refresh coalescing
//!     ↕
//! AuthService (below)  ← the actual network calls, provided by the app
//! ```

#![allow(async_fn_in_trait)]

mod activity;
mod config;
mod coordinator;
mod error;
mod lifecycle;
mod manager;
mod service;
mod state;
mod store;

pub use activity::{ActivityKind, ActivityListener, ParseActivityError};
pub use config::SessionConfig;
pub use coordinator::{RefreshCoordinator, RefreshResult};
pub use error::SessionError;
pub use manager::SessionManager;
pub use service::AuthService;
pub use state::{SessionAction, SessionPhase, SessionState};
pub use store::SessionStore;
