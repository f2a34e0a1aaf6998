//! Observable session store.
//!
//! Wraps a `tokio::sync::watch` channel: the sender holds the current
//! [`SessionState`], every dispatch replaces it under the channel's lock,
//! and any number of receivers can wait for changes. This is what lets
//! the UI re-render and the background task re-arm its timers off the
//! same stream of states.
//!
//! A watch receiver only sees the latest state, so a sign-out followed
//! by a sign-in can reach it as a single "still signed in" change. The
//! store therefore also counts sign-ins; a receiver that compares the
//! count it last saw can tell a new session from the old one.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::time::Instant;

use crate::{SessionAction, SessionState};

/// Holds the current session state and notifies subscribers on change.
pub struct SessionStore {
    tx: watch::Sender<SessionState>,
    /// Transitions from signed out to signed in. Only written under the
    /// channel's lock.
    sign_ins: AtomicU64,
}

impl SessionStore {
    /// Creates a store holding [`SessionState::initial`] stamped with `now`.
    pub fn new(now: Instant) -> Self {
        Self::with_state(SessionState::initial(now))
    }

    /// Creates a store holding an arbitrary starting state.
    pub fn with_state(state: SessionState) -> Self {
        // The receiver is dropped immediately: `send_modify` works without
        // any receiver, and subscribers are created on demand.
        let (tx, _rx) = watch::channel(state);
        Self {
            tx,
            sign_ins: AtomicU64::new(0),
        }
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// A receiver that sees the current state and every later change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// How many times the session went from signed out to signed in.
    ///
    /// Read it while holding a borrow of a subscribed receiver to get the
    /// count that matches the borrowed state.
    pub fn sign_ins(&self) -> u64 {
        self.sign_ins.load(Ordering::Acquire)
    }

    /// Applies one transition. Concurrent dispatches are serialized by the
    /// channel's lock, so no two reductions interleave.
    pub fn dispatch(&self, action: SessionAction) {
        self.tx.send_modify(|state| self.apply(state, action));
    }

    /// Applies the action built by `decide` if it returns one.
    ///
    /// `decide` sees the current state and runs under the same lock as the
    /// reduction, so the check and the update are one atomic step.
    /// Subscribers are only notified when something was dispatched.
    pub fn dispatch_if<F>(&self, decide: F) -> bool
    where
        F: FnOnce(&SessionState) -> Option<SessionAction>,
    {
        self.tx.send_if_modified(|state| match decide(state) {
            Some(action) => {
                self.apply(state, action);
                true
            }
            None => false,
        })
    }

    /// Reduces `action` into `state`. Runs under the channel's write lock.
    fn apply(&self, state: &mut SessionState, action: SessionAction) {
        let name = action.name();
        let was_authenticated = state.is_authenticated;
        *state = state.reduce(action);
        debug_assert!(state.is_consistent(), "inconsistent state after {name}");

        if state.is_authenticated && !was_authenticated {
            self.sign_ins.fetch_add(1, Ordering::Release);
        }
        tracing::trace!(action = name, "session dispatch");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use vigil_protocol::UserRecord;

    use super::*;

    #[tokio::test]
    async fn test_dispatch_notifies_subscribers() {
        let now = Instant::now();
        let store = SessionStore::new(now);
        let mut rx = store.subscribe();

        store.dispatch(SessionAction::SetUser {
            user: UserRecord(json!({ "username": "ana" })),
            at: now,
        });

        rx.changed().await.expect("store alive");
        assert!(rx.borrow_and_update().is_authenticated);
        assert!(store.snapshot().is_authenticated);
    }

    #[tokio::test]
    async fn test_dispatch_if_skips_when_declined() {
        let now = Instant::now();
        let store = SessionStore::new(now);
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        let dispatched = store.dispatch_if(|_| None);

        assert!(!dispatched);
        assert!(!rx.has_changed().expect("store alive"));
    }

    #[tokio::test]
    async fn test_sign_ins_count_only_new_sessions() {
        let now = Instant::now();
        let store = SessionStore::new(now);
        let sign_in = |name: &str| SessionAction::SetUser {
            user: UserRecord(json!({ "username": name })),
            at: now,
        };
        assert_eq!(store.sign_ins(), 0);

        store.dispatch(sign_in("ana"));
        assert_eq!(store.sign_ins(), 1);

        // A profile update while signed in is the same session.
        store.dispatch(sign_in("ana"));
        store.dispatch(SessionAction::SetActivity(now + Duration::from_secs(1)));
        assert_eq!(store.sign_ins(), 1);

        store.dispatch(SessionAction::Logout { at: now });
        assert_eq!(store.sign_ins(), 1);
        assert!(store.dispatch_if(|_| Some(sign_in("bea"))));
        assert_eq!(store.sign_ins(), 2);
    }

    #[tokio::test]
    async fn test_sign_out_and_back_in_reads_as_one_change() {
        let now = Instant::now();
        let store = SessionStore::new(now);
        store.dispatch(SessionAction::SetUser {
            user: UserRecord(json!({ "username": "ana" })),
            at: now,
        });
        let mut rx = store.subscribe();
        let seen = {
            let _state = rx.borrow_and_update();
            store.sign_ins()
        };

        store.dispatch(SessionAction::Logout { at: now });
        store.dispatch(SessionAction::SetUser {
            user: UserRecord(json!({ "username": "ana" })),
            at: now,
        });

        let state = rx.borrow_and_update();
        assert!(state.is_authenticated);
        assert_eq!(store.sign_ins(), seen + 1);
    }

    #[tokio::test]
    async fn test_dispatch_if_applies_action() {
        let now = Instant::now();
        let later = now + Duration::from_secs(2);
        let store = SessionStore::new(now);

        let dispatched = store.dispatch_if(|state| {
            (state.last_activity < later).then_some(SessionAction::SetActivity(later))
        });

        assert!(dispatched);
        assert_eq!(store.snapshot().last_activity, later);
    }
}
