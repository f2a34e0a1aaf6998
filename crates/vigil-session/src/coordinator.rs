//! Refresh de-duplication.
//!
//! Several parts of an app may decide to refresh the token at the same
//! moment (the periodic timer, a request that just got a 401, a tab
//! regaining focus). Sending all of those to the server is wasteful and,
//! with rotating refresh tokens, actively harmful: the second call would
//! present a token the first one already consumed.
//!
//! [`RefreshCoordinator`] collapses every overlapping burst into one call:
//!
//! ```text
//! caller A ──→ [idle] → set in-flight → call service ─────────┐
//! caller B ──→ [in-flight] → queue ───────────────────────────┤→ same outcome
//! caller C ──→ [in-flight] → queue ───────────────────────────┘
//! ```

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use vigil_protocol::SessionPayload;

use crate::SessionError;

/// The outcome every participant of a refresh receives.
pub type RefreshResult = Result<SessionPayload, SessionError>;

/// In-flight flag and the callers waiting on the current flight.
#[derive(Default)]
struct Flight {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshResult>>,
}

/// Ensures at most one refresh call is in flight at a time.
///
/// Owned by a [`SessionManager`](crate::SessionManager), one per manager,
/// so separate managers (and separate tests) never share a flight.
#[derive(Default)]
pub struct RefreshCoordinator {
    flight: Mutex<Flight>,
}

/// Role assigned to a caller by the single check-and-set step.
enum Role {
    Leader,
    Follower(oneshot::Receiver<RefreshResult>),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `call` unless a refresh is already in flight, in which case
    /// this waits for that one and returns its outcome instead.
    ///
    /// The caller that actually runs `call` (the leader) delivers its
    /// outcome to everyone who queued in the meantime, then clears the
    /// flight. If the leader is cancelled before `call` completes, the
    /// waiters receive [`SessionError::RefreshAbandoned`].
    pub async fn run<F, Fut>(&self, call: F) -> RefreshResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshResult>,
    {
        let role = {
            let mut flight = self.lock();
            if flight.in_flight {
                let (tx, rx) = oneshot::channel();
                flight.waiters.push(tx);
                tracing::debug!(
                    waiting = flight.waiters.len(),
                    "refresh already in flight, queued"
                );
                Role::Follower(rx)
            } else {
                flight.in_flight = true;
                Role::Leader
            }
        };

        match role {
            Role::Follower(rx) => rx.await.unwrap_or(Err(SessionError::RefreshAbandoned)),
            Role::Leader => {
                let mut guard = FlightGuard {
                    coordinator: self,
                    settled: false,
                };
                let outcome = call().await;
                guard.settle(&outcome);
                outcome
            }
        }
    }

    /// Whether a refresh call is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight
    }

    /// Number of callers queued behind the in-flight refresh.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    /// The lock is never held across an await and nothing inside it can
    /// panic, so a poisoned lock still holds consistent data.
    fn lock(&self) -> MutexGuard<'_, Flight> {
        self.flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ends the current flight: clears the flag, empties the queue, and
    /// hands `outcome` to every waiter.
    fn finish(&self, outcome: &RefreshResult) {
        let waiters = {
            let mut flight = self.lock();
            flight.in_flight = false;
            std::mem::take(&mut flight.waiters)
        };
        if !waiters.is_empty() {
            tracing::debug!(
                waiters = waiters.len(),
                success = outcome.is_ok(),
                "refresh outcome shared with queued callers"
            );
        }
        for waiter in waiters {
            // A waiter that gave up (its future was dropped) is fine to skip.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Drop guard held by the leader while its call is in flight.
///
/// If the leader's future is dropped mid-call, the flight would otherwise
/// stay "in flight" forever and every later refresh would queue behind a
/// call that never completes.
struct FlightGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl FlightGuard<'_> {
    fn settle(&mut self, outcome: &RefreshResult) {
        self.settled = true;
        self.coordinator.finish(outcome);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("refresh leader cancelled, releasing waiters");
            self.coordinator.finish(&Err(SessionError::RefreshAbandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for `RefreshCoordinator`.
    //!
    //! The leader's call is held open with a `oneshot` gate so that the
    //! other callers are guaranteed to arrive while it is in flight.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use vigil_protocol::ServiceError;

    use super::*;

    fn payload(n: u64) -> SessionPayload {
        SessionPayload(json!({ "generation": n }))
    }

    /// Yields until `n` callers are queued behind the leader.
    async fn until_waiting(coordinator: &RefreshCoordinator, n: usize) {
        while coordinator.waiting() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_run_idle_calls_once_and_clears_flight() {
        let coordinator = RefreshCoordinator::new();
        let calls = AtomicUsize::new(0);

        let result = coordinator
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(payload(1))
            })
            .await;

        assert_eq!(result, Ok(payload(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.waiting(), 0);
    }

    #[tokio::test]
    async fn test_run_overlapping_callers_share_one_call() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                coordinator
                    .run(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = gate.await;
                        Ok(payload(7))
                    })
                    .await
            })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let followers: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    coordinator
                        .run(|| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(payload(99))
                        })
                        .await
                })
            })
            .collect();
        until_waiting(&coordinator, 4).await;

        release.send(()).expect("leader waiting on gate");

        assert_eq!(leader.await.expect("leader task"), Ok(payload(7)));
        for follower in followers {
            assert_eq!(follower.await.expect("follower task"), Ok(payload(7)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.waiting(), 0);
    }

    #[tokio::test]
    async fn test_run_failure_reaches_every_waiter() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let (release, gate) = oneshot::channel::<()>();
        let failure = SessionError::Service(ServiceError::Transport("offline".into()));

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            let failure = failure.clone();
            tokio::spawn(async move {
                coordinator
                    .run(|| async move {
                        let _ = gate.await;
                        Err(failure)
                    })
                    .await
            })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
        let follower = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run(|| async { Ok(payload(0)) }).await })
        };
        until_waiting(&coordinator, 1).await;

        release.send(()).expect("leader waiting on gate");

        assert_eq!(leader.await.expect("leader task"), Err(failure.clone()));
        assert_eq!(follower.await.expect("follower task"), Err(failure));
    }

    #[tokio::test]
    async fn test_run_after_completion_starts_new_flight() {
        let coordinator = RefreshCoordinator::new();
        let calls = AtomicUsize::new(0);

        for n in 1..=3 {
            let result = coordinator
                .run(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(payload(n))
                })
                .await;
            assert_eq!(result, Ok(payload(n)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_leader_releases_waiters() {
        let coordinator = Arc::new(RefreshCoordinator::new());

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .run(|| std::future::pending::<RefreshResult>())
                    .await
            })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
        let follower = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run(|| async { Ok(payload(0)) }).await })
        };
        until_waiting(&coordinator, 1).await;

        leader.abort();

        assert_eq!(
            follower.await.expect("follower task"),
            Err(SessionError::RefreshAbandoned)
        );
        assert!(!coordinator.is_refreshing(), "flight must be released");
    }
}
