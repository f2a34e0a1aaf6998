//! Background lifecycle task: the session's timers and listeners.
//!
//! While a [`SessionManager`](crate::SessionManager) is running, one Tokio
//! task owns everything time-driven:
//!
//! - the initial session check,
//! - the refresh [`IntervalScheduler`],
//! - the inactivity [`Watchdog`],
//! - the activity event queue,
//! - the refresh calls it spawned.
//!
//! All of them are fields of the task, so when the task ends (on `stop()`,
//! or when the manager is dropped) they are all released together, on
//! every exit path.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use vigil_timer::{IntervalConfig, IntervalScheduler, Watchdog};

use crate::activity::ActivityListener;
use crate::manager::Shared;
use crate::{ActivityKind, AuthService, RefreshResult, SessionAction, SessionState};

/// Requests sent from the manager to its lifecycle task.
pub(crate) enum LifecycleCommand {
    /// Stop the refresh timer and disarm the watchdog until resumed.
    /// The task replies on `ack` once both are cancelled.
    SuspendTimers { ack: oneshot::Sender<()> },

    /// Lift a suspension; timers come back if the session is still
    /// authenticated.
    ResumeTimers,

    /// End the task.
    Stop,
}

// ---------------------------------------------------------------------------
// Handle (manager side)
// ---------------------------------------------------------------------------

/// The manager's grip on a running lifecycle task.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown)
/// aborts the task, so timers never outlive their manager.
pub(crate) struct LifecycleHandle {
    commands: mpsc::UnboundedSender<LifecycleCommand>,
    activity: mpsc::Sender<ActivityKind>,
    task: Option<JoinHandle<()>>,
}

impl LifecycleHandle {
    pub(crate) fn listener(&self) -> ActivityListener {
        ActivityListener::new(self.activity.clone())
    }

    pub(crate) fn commands(&self) -> mpsc::UnboundedSender<LifecycleCommand> {
        self.commands.clone()
    }

    /// Asks the task to stop and waits until it has.
    pub(crate) async fn shutdown(mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = self.commands.send(LifecycleCommand::Stop);
        if let Err(e) = task.await {
            if e.is_panic() {
                error!(error = %e, "session lifecycle task panicked");
            }
        }
    }
}

impl Drop for LifecycleHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Timers held off for the duration of an operation (logout, account
/// deletion). Resumes them when dropped, whichever way the operation ends.
pub(crate) struct TimerSuspension {
    commands: Option<mpsc::UnboundedSender<LifecycleCommand>>,
}

impl TimerSuspension {
    /// Suspends the timers of the task behind `commands` (if any) and waits
    /// for the task to confirm.
    pub(crate) async fn acquire(
        commands: Option<mpsc::UnboundedSender<LifecycleCommand>>,
    ) -> Self {
        let Some(commands) = commands else {
            return Self { commands: None };
        };
        let (ack, confirmed) = oneshot::channel();
        if commands
            .send(LifecycleCommand::SuspendTimers { ack })
            .is_err()
        {
            return Self { commands: None };
        }
        // An error here means the task ended, which cancels the timers too.
        let _ = confirmed.await;
        Self {
            commands: Some(commands),
        }
    }
}

impl Drop for TimerSuspension {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(LifecycleCommand::ResumeTimers);
        }
    }
}

/// Spawns the lifecycle task for `shared` and returns its handle.
pub(crate) fn spawn_lifecycle<S: AuthService>(shared: Arc<Shared<S>>) -> LifecycleHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (activity_tx, activity_rx) = mpsc::channel(shared.config.activity_buffer);

    let ticker = IntervalScheduler::new(IntervalConfig {
        initial_jitter: shared.config.refresh_jitter(),
        ..IntervalConfig::with_period(shared.config.refresh_interval())
    });
    let states = shared.store.subscribe();
    let (last_activity, sign_ins) = {
        let state = states.borrow();
        (state.last_activity, shared.store.sign_ins())
    };

    let lifecycle = SessionLifecycle {
        shared,
        commands: commands_rx,
        activity: activity_rx,
        states,
        ticker,
        watchdog: Watchdog::new(),
        refreshes: JoinSet::new(),
        observed_activity: last_activity,
        observed_sign_ins: sign_ins,
        suspended: false,
    };

    LifecycleHandle {
        commands: commands_tx,
        activity: activity_tx,
        task: Some(tokio::spawn(lifecycle.run())),
    }
}

// ---------------------------------------------------------------------------
// Task (background side)
// ---------------------------------------------------------------------------

struct SessionLifecycle<S: AuthService> {
    shared: Arc<Shared<S>>,
    commands: mpsc::UnboundedReceiver<LifecycleCommand>,
    activity: mpsc::Receiver<ActivityKind>,
    states: watch::Receiver<SessionState>,
    ticker: IntervalScheduler,
    watchdog: Watchdog,
    /// Refresh calls started by the ticker. Aborted when the task ends.
    refreshes: JoinSet<RefreshResult>,
    /// `last_activity` as of the last timer sync; a change re-arms the
    /// watchdog.
    observed_activity: Instant,
    /// Store sign-in count as of the last timer sync; a change means a new
    /// session, which gets a fresh refresh schedule.
    observed_sign_ins: u64,
    suspended: bool,
}

impl<S: AuthService> SessionLifecycle<S> {
    async fn run(mut self) {
        info!("session lifecycle started");

        if self.initial_check().await {
            self.sync_timers();
            self.event_loop().await;
        }

        info!(
            refreshes_in_flight = self.refreshes.len(),
            "session lifecycle stopped"
        );
    }

    /// Runs the initial session check, still answering commands while it
    /// is in flight. Returns `false` if a stop arrived first; the check's
    /// result is then dropped unapplied and the loading flag it raised is
    /// lowered again.
    async fn initial_check(&mut self) -> bool {
        let shared = Arc::clone(&self.shared);
        let check = shared.check_auth();
        tokio::pin!(check);

        loop {
            tokio::select! {
                () = &mut check => return true,
                cmd = self.commands.recv() => match cmd {
                    Some(LifecycleCommand::SuspendTimers { ack }) => {
                        self.suspended = true;
                        let _ = ack.send(());
                    }
                    Some(LifecycleCommand::ResumeTimers) => self.suspended = false,
                    Some(LifecycleCommand::Stop) | None => {
                        debug!("stopped during initial session check");
                        self.shared.store.dispatch_if(|state| {
                            state.loading.then_some(SessionAction::SetLoading(false))
                        });
                        return false;
                    }
                },
            }
        }
    }

    async fn event_loop(&mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(LifecycleCommand::SuspendTimers { ack }) => {
                        self.suspended = true;
                        self.cancel_timers();
                        let _ = ack.send(());
                    }
                    Some(LifecycleCommand::ResumeTimers) => {
                        self.suspended = false;
                        self.sync_timers();
                    }
                    Some(LifecycleCommand::Stop) | None => break,
                },
                changed = self.states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.sync_timers();
                }
                Some(kind) = self.activity.recv() => {
                    if self.shared.record_activity() {
                        trace!(%kind, "activity recorded");
                    }
                }
                info = self.ticker.wait_for_tick() => {
                    if info.overrun {
                        debug!(
                            tick = info.tick,
                            skipped = info.ticks_skipped,
                            late_ms = info.late_by.as_millis() as u64,
                            "refresh tick fired late"
                        );
                    } else {
                        trace!(tick = info.tick, "refresh tick");
                    }
                    let shared = Arc::clone(&self.shared);
                    self.refreshes.spawn(async move { shared.refresh().await });
                }
                deadline = self.watchdog.expired() => {
                    info!(
                        idle_secs = self.shared.config.inactivity_timeout_secs,
                        late_ms = Instant::now().saturating_duration_since(deadline).as_millis() as u64,
                        "session expired after inactivity"
                    );
                    self.cancel_timers();
                    self.shared.expire_session().await;
                }
                Some(joined) = self.refreshes.join_next() => match joined {
                    Ok(Ok(_)) => debug!("background token refresh succeeded"),
                    // Left to the next real request (or the watchdog) to
                    // notice an expired session.
                    Ok(Err(e)) => warn!(error = %e, "background token refresh failed"),
                    Err(e) if e.is_panic() => error!(error = %e, "refresh task panicked"),
                    Err(_) => {}
                },
            }
        }
    }

    /// Brings the timers in line with the current state.
    ///
    /// Signed out: both cancelled. Signed in (and not suspended): the
    /// ticker runs, and the watchdog is armed for `last_activity +
    /// inactivity_timeout`, re-armed whenever `last_activity` moved. A
    /// sign-in since the last sync restarts both, even if this receiver
    /// never saw the signed-out state in between.
    fn sync_timers(&mut self) {
        let (authenticated, last_activity, sign_ins) = {
            let state = self.states.borrow_and_update();
            (
                state.is_authenticated,
                state.last_activity,
                self.shared.store.sign_ins(),
            )
        };
        let activity_moved = last_activity != self.observed_activity;
        self.observed_activity = last_activity;
        let new_session = sign_ins != self.observed_sign_ins;
        self.observed_sign_ins = sign_ins;

        if !authenticated {
            if self.ticker.is_running() || self.watchdog.is_armed() {
                debug!("signed out, cancelling session timers");
            }
            self.cancel_timers();
            return;
        }
        if new_session && (self.ticker.is_running() || self.watchdog.is_armed()) {
            debug!(sign_ins, "new session, restarting session timers");
            self.cancel_timers();
        }
        if self.suspended {
            return;
        }

        if !self.ticker.is_running() {
            self.ticker.start();
        }
        if activity_moved || !self.watchdog.is_armed() {
            self.arm_watchdog(last_activity);
        }
    }

    /// Arms the watchdog for the time left before the session counts as
    /// idle. A deadline already in the past fires on the next loop turn.
    fn arm_watchdog(&mut self, last_activity: Instant) {
        let deadline = last_activity + self.shared.config.inactivity_timeout();
        if deadline <= Instant::now() {
            debug!("inactivity deadline already passed");
        }
        self.watchdog.arm(deadline);
    }

    fn cancel_timers(&mut self) {
        self.ticker.stop();
        self.watchdog.disarm();
    }
}
