//! Session demo: an in-memory auth backend driven through a full session.
//!
//! Walks through a rejected login, registration, a few rounds of user
//! activity with background refreshes, a profile update, a password
//! change, an inactivity logout, and an explicit logout.
//!
//! ```text
//! cargo run -p session-demo                 # short demo timings
//! cargo run -p session-demo -- session.json # timings from a config file
//! RUST_LOG=vigil_session=trace cargo run -p session-demo
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};
use vigil::prelude::*;

// ---------------------------------------------------------------------------
// In-memory auth backend
// ---------------------------------------------------------------------------

struct Account {
    email: String,
    password: String,
}

/// A backend that keeps accounts in a map and "signs in" one user at a
/// time. Every call takes a few milliseconds, like a fast local API.
#[derive(Default)]
struct InMemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<String>>,
    issued: AtomicU64,
}

const LATENCY: Duration = Duration::from_millis(20);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryAuth {
    fn issue_token(&self) -> Value {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        json!({ "access": format!("token-{n}") })
    }

    fn profile(&self, username: &str) -> Option<Value> {
        lock(&self.accounts)
            .get(username)
            .map(|account| json!({ "username": username, "email": account.email }))
    }

    fn signed_in(&self) -> Option<String> {
        lock(&self.current).clone()
    }
}

fn not_signed_in() -> ServiceResponse {
    ServiceResponse::new(status::UNAUTHORIZED, json!({ "detail": "not signed in" }))
}

impl AuthService for InMemoryAuth {
    async fn get_user(&self) -> Result<ServiceResponse, ServiceError> {
        tokio::time::sleep(LATENCY).await;
        Ok(self
            .signed_in()
            .and_then(|username| self.profile(&username))
            .map_or_else(not_signed_in, ServiceResponse::ok))
    }

    async fn login(&self, credentials: &Credentials) -> Result<ServiceResponse, ServiceError> {
        tokio::time::sleep(LATENCY).await;
        let valid = lock(&self.accounts)
            .get(&credentials.username)
            .is_some_and(|account| account.password == credentials.password);
        if !valid {
            return Ok(ServiceResponse::new(
                status::UNAUTHORIZED,
                json!({ "erro": "invalid credentials" }),
            ));
        }
        *lock(&self.current) = Some(credentials.username.clone());
        Ok(ServiceResponse::ok(self.issue_token()))
    }

    async fn register(&self, registration: &Registration) -> Result<ServiceResponse, ServiceError> {
        tokio::time::sleep(LATENCY).await;
        {
            let mut accounts = lock(&self.accounts);
            if accounts.contains_key(&registration.username) {
                return Ok(ServiceResponse::new(
                    status::BAD_REQUEST,
                    json!({ "detail": "username already taken" }),
                ));
            }
            accounts.insert(
                registration.username.clone(),
                Account {
                    email: registration.email.clone(),
                    password: registration.password.clone(),
                },
            );
        }
        *lock(&self.current) = Some(registration.username.clone());
        Ok(ServiceResponse::new(status::CREATED, self.issue_token()))
    }

    async fn refresh_token(&self) -> Result<ServiceResponse, ServiceError> {
        tokio::time::sleep(LATENCY).await;
        Ok(match self.signed_in() {
            Some(_) => ServiceResponse::ok(self.issue_token()),
            None => not_signed_in(),
        })
    }

    async fn logout(&self) -> Result<ServiceResponse, ServiceError> {
        tokio::time::sleep(LATENCY).await;
        *lock(&self.current) = None;
        Ok(ServiceResponse::ok(json!({})))
    }

    async fn update_user(&self, changes: &Value) -> Result<ServiceResponse, ServiceError> {
        tokio::time::sleep(LATENCY).await;
        let Some(username) = self.signed_in() else {
            return Ok(not_signed_in());
        };
        if let Some(email) = changes.get("email").and_then(Value::as_str) {
            if let Some(account) = lock(&self.accounts).get_mut(&username) {
                account.email = email.to_owned();
            }
        }
        Ok(self
            .profile(&username)
            .map_or_else(not_signed_in, ServiceResponse::ok))
    }

    async fn check_session(&self) -> Result<ServiceResponse, ServiceError> {
        tokio::time::sleep(LATENCY).await;
        Ok(match self.signed_in() {
            Some(_) => ServiceResponse::ok(json!({})),
            None => not_signed_in(),
        })
    }

    async fn change_password(
        &self,
        change: &PasswordChange,
    ) -> Result<ServiceResponse, ServiceError> {
        tokio::time::sleep(LATENCY).await;
        let Some(username) = self.signed_in() else {
            return Ok(not_signed_in());
        };
        let mut accounts = lock(&self.accounts);
        match accounts.get_mut(&username) {
            Some(account) if account.password == change.current_password => {
                account.password = change.new_password.clone();
                Ok(ServiceResponse::ok(json!({})))
            }
            _ => Ok(ServiceResponse::new(
                status::BAD_REQUEST,
                json!({ "detail": "current password is wrong" }),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Walkthrough
// ---------------------------------------------------------------------------

fn demo_config() -> SessionConfig {
    SessionConfig {
        refresh_interval_secs: 2,
        inactivity_timeout_secs: 5,
        ..SessionConfig::default()
    }
}

/// Waits until the manager's state satisfies `ready`.
async fn wait_until<S, F>(manager: &SessionManager<S>, ready: F)
where
    S: AuthService,
    F: FnMut(&SessionState) -> bool,
{
    let mut states = manager.subscribe();
    let _ = states.wait_for(ready).await;
}

#[tokio::main]
async fn main() -> Result<(), VigilError> {
    vigil::telemetry::init_tracing("session_demo=info,vigil_session=info,warn");

    let config = match std::env::args().nth(1) {
        Some(path) => vigil::config::load_config(path)?,
        None => demo_config(),
    };
    info!(
        refresh_secs = config.refresh_interval_secs,
        idle_secs = config.inactivity_timeout_secs,
        "starting session demo"
    );

    let manager = SessionManager::new(InMemoryAuth::default(), config);

    // Log every phase change as it happens.
    let mut states = manager.subscribe();
    let watcher = tokio::spawn(async move {
        let mut last = states.borrow_and_update().phase();
        while states.changed().await.is_ok() {
            let phase = states.borrow_and_update().phase();
            if phase != last {
                info!(?phase, "phase changed");
                last = phase;
            }
        }
    });

    manager.start()?;
    wait_until(&manager, |state| !state.loading).await;

    // 1. Nobody has an account yet.
    match manager.login(&Credentials::new("ana", "hunter2")).await {
        Err(e) => info!(error = %e, "login rejected"),
        Ok(_) => warn!("login unexpectedly accepted"),
    }
    manager.clear_error();

    // 2. Sign up, which also signs in.
    let registration =
        Registration::new("ana", "ana@example.com", "hunter2").with_field("first_name", "Ana");
    let payload = manager.register(&registration).await?;
    info!(token = %payload.0, "registered");

    // 3. Stay busy for a while; refreshes keep running in the background.
    if let Some(listener) = manager.activity_listener() {
        for kind in [
            ActivityKind::PointerMove,
            ActivityKind::KeyPress,
            ActivityKind::Scroll,
        ] {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            listener.notify(kind);
            info!(%kind, "user activity");
        }
    }

    let user = manager
        .update_user(&json!({ "email": "ana@work.example" }))
        .await?;
    info!(email = ?user.field("email"), "profile updated");

    if let Err(e) = manager
        .change_password(&PasswordChange::new("wrong", "hunter3"))
        .await
    {
        info!(error = %e, "password change rejected");
    }
    manager
        .change_password(&PasswordChange::new("hunter2", "hunter3"))
        .await?;
    info!("password changed");

    // 4. Go idle until the watchdog signs us out.
    info!(
        idle_secs = manager.config().inactivity_timeout_secs,
        "going idle"
    );
    wait_until(&manager, |state| !state.is_authenticated).await;
    info!(server_session = manager.check_session().await?, "signed out after idling");

    // 5. Back in, then out on purpose.
    manager.login(&Credentials::new("ana", "hunter3")).await?;
    manager.logout().await?;

    manager.stop().await;
    watcher.abort();
    info!("demo finished");
    Ok(())
}
