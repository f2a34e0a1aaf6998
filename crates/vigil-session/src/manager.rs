//! The session manager: the public face of the session layer.
//!
//! It owns the [`SessionStore`], the [`RefreshCoordinator`] and the auth
//! service, and exposes the operations the UI calls (login, register,
//! logout...). Everything time-driven (refresh, inactivity logout,
//! activity events) runs on a background task started with
//! [`SessionManager::start`].
//!
//! # Lifecycle
//!
//! ```text
//! new() ──→ start() ──→ [check session] ──→ [running] ──→ stop()
//!              │                               │
//!              │                 ┌─────────────┼──────────────┐
//!              │                 ▼             ▼              ▼
//!              │          refresh tick   activity event   idle deadline
//!              │                                              │
//!              ▼                                              ▼
//!       activity_listener()                            auto logout
//! ```
//!
//! The operations themselves work whether or not the manager is started;
//! only the timers and the activity listener need the background task.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vigil_protocol::{
    AvatarUpload, Credentials, GoogleCredential, PasswordChange, Registration, ServiceError,
    ServiceResponse, SessionPayload, UserRecord, status,
};

use crate::activity::throttled_activity;
use crate::lifecycle::{LifecycleHandle, TimerSuspension, spawn_lifecycle};
use crate::{
    ActivityListener, AuthService, RefreshCoordinator, RefreshResult, SessionAction,
    SessionConfig, SessionError, SessionPhase, SessionState, SessionStore,
};

/// State shared between the manager and its background task.
pub(crate) struct Shared<S> {
    pub(crate) service: S,
    pub(crate) store: SessionStore,
    pub(crate) coordinator: RefreshCoordinator,
    pub(crate) config: SessionConfig,
}

impl<S: AuthService> Shared<S> {
    /// Awaits a service call, bounded by the configured request timeout.
    async fn call<F>(&self, request: F) -> Result<ServiceResponse, ServiceError>
    where
        F: Future<Output = Result<ServiceResponse, ServiceError>>,
    {
        match self.config.request_timeout() {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or(Err(ServiceError::Timeout)),
            None => request.await,
        }
    }

    /// Asks the service who is signed in and records the answer.
    ///
    /// Anything other than a `200` (including a failed call) counts as
    /// "nobody", with no error shown: not having a session is not a
    /// failure.
    pub(crate) async fn check_auth(&self) {
        self.store.dispatch(SessionAction::SetLoading(true));
        match self.call(self.service.get_user()).await {
            Ok(response) if response.is(status::OK) => {
                let user = response.into_user();
                info!(user = ?user_label(&user), "session established");
                self.store.dispatch(SessionAction::SetUser {
                    user,
                    at: Instant::now(),
                });
            }
            Ok(response) => {
                debug!(status = response.status, "no active session");
                self.store.dispatch(SessionAction::Logout { at: Instant::now() });
            }
            Err(e) => {
                debug!(error = %e, "session check failed, treating as signed out");
                self.store.dispatch(SessionAction::Logout { at: Instant::now() });
            }
        }
    }

    /// Renews the token through the coordinator. Never touches the state.
    pub(crate) async fn refresh(&self) -> RefreshResult {
        self.coordinator
            .run(|| async {
                let response = self.call(self.service.refresh_token()).await?;
                expect_status(response, status::OK, "token refresh failed")
                    .map(ServiceResponse::into_payload)
            })
            .await
    }

    /// Records activity happening now, unless the last recorded activity
    /// is within the debounce window. Returns whether it was recorded.
    pub(crate) fn record_activity(&self) -> bool {
        let now = Instant::now();
        let debounce = self.config.activity_debounce();
        self.store
            .dispatch_if(|state| throttled_activity(state, now, debounce))
    }

    /// Ends an idle session: tells the service (best effort) and resets
    /// the state.
    pub(crate) async fn expire_session(&self) {
        match self.call(self.service.logout()).await {
            Ok(response) if response.is(status::OK) => {}
            Ok(response) => debug!(status = response.status, "logout after expiry rejected"),
            Err(e) => debug!(error = %e, "logout after expiry failed"),
        }
        self.store.dispatch(SessionAction::Logout { at: Instant::now() });
    }

    /// Shared tail of every sign-in flavour: on success, re-check the session
    /// and hand back the payload; on failure, surface the message.
    async fn finish_sign_in(
        &self,
        outcome: Result<ServiceResponse, ServiceError>,
        expected: u16,
        fallback: &str,
    ) -> Result<SessionPayload, SessionError> {
        let accepted = outcome
            .map_err(SessionError::from)
            .and_then(|response| expect_status(response, expected, fallback));
        match accepted {
            Ok(response) => {
                self.check_auth().await;
                Ok(response.into_payload())
            }
            Err(err) => {
                warn!(error = %err, status = ?err.status(), "{fallback}");
                self.store.dispatch(SessionAction::SetError(err.to_string()));
                Err(err)
            }
        }
    }
}

/// Turns an unexpected status into [`SessionError::Rejected`], taking the
/// message from the body when the server gave one.
fn expect_status(
    response: ServiceResponse,
    expected: u16,
    fallback: &str,
) -> Result<ServiceResponse, SessionError> {
    if response.is(expected) {
        return Ok(response);
    }
    Err(SessionError::Rejected {
        status: response.status,
        message: response
            .error_message()
            .unwrap_or_else(|| fallback.to_owned()),
    })
}

/// Shared tail of profile edits: on `200` the returned record replaces the
/// user in the state. Failures leave the state untouched.
fn replace_user(
    store: &SessionStore,
    outcome: Result<ServiceResponse, ServiceError>,
    fallback: &str,
) -> Result<UserRecord, SessionError> {
    let user = expect_status(outcome?, status::OK, fallback)?.into_user();
    store.dispatch(SessionAction::SetUser {
        user: user.clone(),
        at: Instant::now(),
    });
    Ok(user)
}

/// Something to identify the user by in logs.
fn user_label(user: &UserRecord) -> Option<&str> {
    user.field("username").or_else(|| user.field("email"))
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owns one client session: its state, its timers and its operations.
///
/// One manager per signed-in surface (an app window, a test). Managers
/// share nothing, so several can run side by side.
///
/// ```rust,no_run
/// # use vigil_session::{AuthService, SessionConfig, SessionManager};
/// # async fn demo<S: AuthService>(service: S) -> Result<(), vigil_session::SessionError> {
/// let manager = SessionManager::new(service, SessionConfig::default());
/// manager.start()?;
///
/// let mut states = manager.subscribe();
/// while states.changed().await.is_ok() {
///     println!("{:?}", states.borrow_and_update().phase());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SessionManager<S: AuthService> {
    shared: Arc<Shared<S>>,
    /// `Some` while started. A std mutex: it is never held across an
    /// await.
    lifecycle: Mutex<Option<LifecycleHandle>>,
}

impl<S: AuthService> SessionManager<S> {
    /// Creates a stopped manager in the initial state (loading, nobody
    /// signed in).
    pub fn new(service: S, config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                service,
                store: SessionStore::new(Instant::now()),
                coordinator: RefreshCoordinator::new(),
                config: config.validated(),
            }),
            lifecycle: Mutex::new(None),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Starts the background task: checks for an existing session, then
    /// runs the refresh timer, the inactivity watchdog and the activity
    /// listener for as long as the manager is running.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// [`SessionError::AlreadyStarted`] if already running.
    pub fn start(&self) -> Result<(), SessionError> {
        let mut slot = self.lock_lifecycle();
        if slot.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        *slot = Some(spawn_lifecycle(Arc::clone(&self.shared)));
        debug!("session manager started");
        Ok(())
    }

    /// Stops the background task: cancels both timers, detaches every
    /// [`ActivityListener`], and abandons an initial check still in
    /// flight. Does nothing if not running.
    ///
    /// The state is otherwise left as is. An abandoned check never signs
    /// anyone in or out, but it does lower the loading flag it raised, so
    /// the phase reads signed out. A later [`start`](Self::start) checks
    /// the session again.
    pub async fn stop(&self) {
        let handle = self.lock_lifecycle().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            debug!("session manager stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_lifecycle().is_some()
    }

    /// A listener for feeding interaction events in, or `None` if the
    /// manager is not running.
    pub fn activity_listener(&self) -> Option<ActivityListener> {
        self.lock_lifecycle()
            .as_ref()
            .map(LifecycleHandle::listener)
    }

    // -- observation --------------------------------------------------------

    /// A copy of the current state.
    pub fn state(&self) -> SessionState {
        self.shared.store.snapshot()
    }

    /// A receiver that sees every state change from now on.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.store.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.store.snapshot().phase()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// The manager's refresh coordinator, for diagnostics.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.shared.coordinator
    }

    // -- operations ---------------------------------------------------------

    /// Re-checks whether a session exists. Sets the user on `200`,
    /// otherwise resets to signed out (without an error).
    pub async fn check_auth(&self) {
        self.shared.check_auth().await;
    }

    /// Signs in.
    ///
    /// On `200` the session is re-checked (which sets the user) and the
    /// login response body is returned. Anything else sets the state's
    /// error to the server's message (or "login failed") and returns it.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionPayload, SessionError> {
        self.begin_sign_in();
        let outcome = self.shared.call(self.shared.service.login(credentials)).await;
        self.shared
            .finish_sign_in(outcome, status::OK, "login failed")
            .await
    }

    /// Creates an account. Same as [`login`](Self::login) but expects
    /// `201`, and the fallback message is "registration failed".
    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<SessionPayload, SessionError> {
        self.begin_sign_in();
        let outcome = self
            .shared
            .call(self.shared.service.register(registration))
            .await;
        self.shared
            .finish_sign_in(outcome, status::CREATED, "registration failed")
            .await
    }

    /// Signs in with a Google identity token. Same as
    /// [`login`](Self::login), with "google sign-in failed" as the fallback
    /// message.
    pub async fn login_with_google(
        &self,
        credential: &GoogleCredential,
    ) -> Result<SessionPayload, SessionError> {
        self.begin_sign_in();
        let outcome = self
            .shared
            .call(self.shared.service.google_auth(credential))
            .await;
        self.shared
            .finish_sign_in(outcome, status::OK, "google sign-in failed")
            .await
    }

    /// Asks the service whether a session exists, without fetching the
    /// user or touching the state. `Ok(true)` on `200`, `Ok(false)` on
    /// `401`.
    ///
    /// # Errors
    /// Any other status, or a failed call.
    pub async fn check_session(&self) -> Result<bool, SessionError> {
        let response = self.shared.call(self.shared.service.check_session()).await?;
        if response.is(status::UNAUTHORIZED) {
            return Ok(false);
        }
        expect_status(response, status::OK, "session check failed").map(|_| true)
    }

    /// Signs out.
    ///
    /// Timers are cancelled before the network call, and the state is
    /// reset whatever the call returns. The call's own outcome is still
    /// reported, for callers that care.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let _suspended = self.suspend_timers().await;
        let outcome = self
            .shared
            .call(self.shared.service.logout())
            .await
            .map_err(SessionError::from)
            .and_then(|response| expect_status(response, status::OK, "logout failed"));
        if let Err(e) = &outcome {
            warn!(error = %e, "logout call failed, signing out locally");
        }
        self.shared
            .store
            .dispatch(SessionAction::Logout { at: Instant::now() });
        info!("signed out");
        outcome.map(drop)
    }

    /// Clears the error message and nothing else.
    pub fn clear_error(&self) {
        self.shared.store.dispatch(SessionAction::ClearError);
    }

    /// Records user activity now, subject to the debounce. Returns whether
    /// it was recorded.
    ///
    /// Works whether or not the manager is running; running managers also
    /// record events from their [`ActivityListener`]s.
    pub fn update_activity(&self) -> bool {
        self.shared.record_activity()
    }

    /// Renews the token now. Overlaps with a refresh already in flight
    /// (the timer's, or another caller's) are collapsed into that one.
    ///
    /// The state is not touched either way.
    pub async fn refresh(&self) -> RefreshResult {
        self.shared.refresh().await
    }

    /// Applies `changes` to the current user. On `200` the returned
    /// record replaces the user in the state. Failures leave the state
    /// untouched.
    pub async fn update_user(&self, changes: &Value) -> Result<UserRecord, SessionError> {
        let outcome = self
            .shared
            .call(self.shared.service.update_user(changes))
            .await;
        replace_user(&self.shared.store, outcome, "profile update failed")
    }

    /// Uploads a new profile picture. Like
    /// [`update_user`](Self::update_user), the returned record replaces the
    /// user on `200`.
    pub async fn update_avatar(&self, avatar: &AvatarUpload) -> Result<UserRecord, SessionError> {
        let outcome = self
            .shared
            .call(self.shared.service.update_avatar(avatar))
            .await;
        replace_user(&self.shared.store, outcome, "avatar update failed")
    }

    /// Changes the password. Never touches the state: the session stays
    /// signed in whether or not the change went through.
    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), SessionError> {
        let response = self
            .shared
            .call(self.shared.service.change_password(change))
            .await?;
        expect_status(response, status::OK, "password change failed")?;
        info!("password changed");
        Ok(())
    }

    /// Deletes the account and, on `200`, signs out locally. Failures leave
    /// the session as it was.
    pub async fn delete_account(&self) -> Result<(), SessionError> {
        let _suspended = self.suspend_timers().await;
        let response = self
            .shared
            .call(self.shared.service.delete_account())
            .await?;
        expect_status(response, status::OK, "account deletion failed")?;
        self.shared
            .store
            .dispatch(SessionAction::Logout { at: Instant::now() });
        info!("account deleted, signed out");
        Ok(())
    }

    // -- internals ----------------------------------------------------------

    fn begin_sign_in(&self) {
        self.shared.store.dispatch(SessionAction::SetLoading(true));
        self.shared.store.dispatch(SessionAction::ClearError);
    }

    /// Holds the timers off until the returned value is dropped.
    async fn suspend_timers(&self) -> TimerSuspension {
        let commands = self
            .lock_lifecycle()
            .as_ref()
            .map(LifecycleHandle::commands);
        TimerSuspension::acquire(commands).await
    }

    /// Nothing inside the lock can panic, so a poisoned lock still holds a
    /// valid handle.
    fn lock_lifecycle(&self) -> MutexGuard<'_, Option<LifecycleHandle>> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
