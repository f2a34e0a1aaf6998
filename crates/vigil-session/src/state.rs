//! Session state and the transitions that change it.
//!
//! The state is a single record. It never changes in place from the
//! outside: every change is a [`SessionAction`] run through
//! [`SessionState::reduce`], a pure function of (old state, action).
//! Timestamps travel inside the actions, so reducing never reads a clock
//! and the same inputs always give the same output.

use tokio::time::Instant;
use vigil_protocol::UserRecord;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Everything the UI needs to know about the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// The signed-in user, if any.
    pub user: Option<UserRecord>,

    /// `true` iff `user` is present (and therefore `error` is absent).
    pub is_authenticated: bool,

    /// `true` while a session-establishing call is in flight.
    pub loading: bool,

    /// The last user-facing error (failed login or registration).
    pub error: Option<String>,

    /// When the user last did something real (click, key press, scroll...).
    ///
    /// Monotonic `tokio` clock, so tests can drive it with paused time.
    pub last_activity: Instant,
}

impl SessionState {
    /// The state at process start: nobody signed in, check pending.
    pub fn initial(now: Instant) -> Self {
        Self {
            user: None,
            is_authenticated: false,
            loading: true,
            error: None,
            last_activity: now,
        }
    }

    /// The state after a logout: the initial state, minus `loading`.
    pub fn logged_out(now: Instant) -> Self {
        Self {
            loading: false,
            ..Self::initial(now)
        }
    }

    /// Applies one transition and returns the resulting state.
    pub fn reduce(&self, action: SessionAction) -> Self {
        match action {
            SessionAction::SetLoading(loading) => Self {
                loading,
                ..self.clone()
            },
            SessionAction::SetUser { user, at } => Self {
                user: Some(user),
                is_authenticated: true,
                loading: false,
                error: None,
                last_activity: at,
            },
            SessionAction::SetError(message) => Self {
                user: None,
                is_authenticated: false,
                loading: false,
                error: Some(message),
                last_activity: self.last_activity,
            },
            SessionAction::ClearError => Self {
                error: None,
                ..self.clone()
            },
            SessionAction::Logout { at } => Self::logged_out(at),
            SessionAction::SetActivity(at) => Self {
                last_activity: at,
                ..self.clone()
            },
        }
    }

    /// Whether the authenticated flag agrees with user and error.
    ///
    /// Holds after every transition; checked in debug builds on every
    /// dispatch.
    pub fn is_consistent(&self) -> bool {
        self.is_authenticated == (self.user.is_some() && self.error.is_none())
    }

    /// Coarse view of the state for UI routing.
    pub fn phase(&self) -> SessionPhase {
        if self.is_authenticated {
            SessionPhase::Authenticated
        } else if self.loading {
            SessionPhase::Loading
        } else {
            SessionPhase::Unauthenticated {
                error: self.error.clone(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SessionAction
// ---------------------------------------------------------------------------

/// The fixed set of transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Sets the loading flag only.
    SetLoading(bool),

    /// A session was established for `user` at `at`. Clears any error
    /// and loading, and counts as activity.
    SetUser { user: UserRecord, at: Instant },

    /// A session-establishing call failed with a user-facing message.
    /// Clears the user.
    SetError(String),

    /// Clears the error only.
    ClearError,

    /// Back to the initial state (not loading), stamped with `at`.
    Logout { at: Instant },

    /// Records real user activity at the given instant.
    SetActivity(Instant),
}

impl SessionAction {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetLoading(_) => "SET_LOADING",
            Self::SetUser { .. } => "SET_USER",
            Self::SetError(_) => "SET_ERROR",
            Self::ClearError => "CLEAR_ERROR",
            Self::Logout { .. } => "LOGOUT",
            Self::SetActivity(_) => "SET_ACTIVITY",
        }
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// The lifecycle position of the session:
///
/// ```text
///   Loading ──(user found / login ok)──→ Authenticated
///      │                                     │
///      └──(no session / failure)──→ Unauthenticated ←──(logout / expiry)
/// ```
///
/// The initial state (before the first check settles) reports `Loading`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    Authenticated,
    Unauthenticated { error: Option<String> },
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn user() -> UserRecord {
        UserRecord(json!({ "username": "ana" }))
    }

    fn all_actions(t: Instant) -> Vec<SessionAction> {
        vec![
            SessionAction::SetLoading(true),
            SessionAction::SetLoading(false),
            SessionAction::SetUser { user: user(), at: t },
            SessionAction::SetError("boom".into()),
            SessionAction::ClearError,
            SessionAction::Logout { at: t },
            SessionAction::SetActivity(t),
        ]
    }

    #[test]
    fn test_initial_state_is_loading_and_signed_out() {
        let now = Instant::now();
        let state = SessionState::initial(now);
        assert!(state.loading);
        assert!(!state.is_authenticated);
        assert_eq!(state.user, None);
        assert_eq!(state.error, None);
        assert_eq!(state.phase(), SessionPhase::Loading);
    }

    #[test]
    fn test_set_user_authenticates_and_clears_error() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(5);
        let state = SessionState::initial(t0)
            .reduce(SessionAction::SetError("old".into()))
            .reduce(SessionAction::SetUser { user: user(), at: t1 });

        assert!(state.is_authenticated);
        assert!(!state.loading);
        assert_eq!(state.error, None);
        assert_eq!(state.user, Some(user()));
        assert_eq!(state.last_activity, t1);
        assert_eq!(state.phase(), SessionPhase::Authenticated);
    }

    #[test]
    fn test_set_error_clears_user() {
        let t = Instant::now();
        let state = SessionState::initial(t)
            .reduce(SessionAction::SetUser { user: user(), at: t })
            .reduce(SessionAction::SetError("invalid credentials".into()));

        assert!(!state.is_authenticated);
        assert_eq!(state.user, None);
        assert_eq!(state.error.as_deref(), Some("invalid credentials"));
        assert_eq!(
            state.phase(),
            SessionPhase::Unauthenticated {
                error: Some("invalid credentials".into())
            }
        );
    }

    #[test]
    fn test_clear_error_touches_nothing_else() {
        let t = Instant::now();
        let before = SessionState::initial(t)
            .reduce(SessionAction::SetError("x".into()))
            .reduce(SessionAction::SetLoading(true));

        let after = before.reduce(SessionAction::ClearError);

        assert_eq!(after.error, None);
        assert_eq!(after.loading, before.loading);
        assert_eq!(after.user, before.user);
        assert_eq!(after.last_activity, before.last_activity);
    }

    #[test]
    fn test_set_activity_keeps_auth_status() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(3);
        let before = SessionState::initial(t0)
            .reduce(SessionAction::SetUser { user: user(), at: t0 });

        let after = before.reduce(SessionAction::SetActivity(t1));

        assert_eq!(after.last_activity, t1);
        assert_eq!(after.is_authenticated, before.is_authenticated);
        assert_eq!(after.user, before.user);
    }

    #[test]
    fn test_logout_yields_initial_shape_from_any_state() {
        let t0 = Instant::now();
        let at = t0 + Duration::from_secs(60);
        for action in all_actions(t0) {
            let prior = SessionState::initial(t0).reduce(action);
            let state = prior.reduce(SessionAction::Logout { at });
            assert_eq!(state, SessionState::logged_out(at));
            assert!(!state.loading);
        }
    }

    #[test]
    fn test_invariant_holds_for_every_sequence_of_two_and_three() {
        // Exhaustive over all pairs and triples of transitions.
        let t = Instant::now();
        let actions = all_actions(t);
        for a in &actions {
            for b in &actions {
                let two = SessionState::initial(t)
                    .reduce(a.clone())
                    .reduce(b.clone());
                assert!(two.is_consistent(), "{} then {}", a.name(), b.name());
                for c in &actions {
                    let three = two.reduce(c.clone());
                    assert!(
                        three.is_consistent(),
                        "{} then {} then {}",
                        a.name(),
                        b.name(),
                        c.name()
                    );
                }
            }
        }
    }

    #[test]
    fn test_set_loading_while_authenticated_keeps_phase() {
        let t = Instant::now();
        let state = SessionState::initial(t)
            .reduce(SessionAction::SetUser { user: user(), at: t })
            .reduce(SessionAction::SetLoading(true));
        assert!(state.loading);
        assert_eq!(state.phase(), SessionPhase::Authenticated);
    }
}
