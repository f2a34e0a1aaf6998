//! User activity tracking.
//!
//! The inactivity watchdog needs to know when the user last did
//! something. UI bindings forward raw interaction events through an
//! [`ActivityListener`]; the session manager throttles them so that a
//! mouse being dragged across the screen costs one state update per
//! second, not hundreds.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use crate::{SessionAction, SessionState};

/// The interaction classes that count as real user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    PointerPress,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
}

impl ActivityKind {
    /// Every tracked kind, in a fixed order.
    pub const ALL: [ActivityKind; 5] = [
        Self::PointerPress,
        Self::PointerMove,
        Self::KeyPress,
        Self::Scroll,
        Self::TouchStart,
    ];

    /// The DOM event name this kind is bound to.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::PointerPress => "mousedown",
            Self::PointerMove => "mousemove",
            Self::KeyPress => "keypress",
            Self::Scroll => "scroll",
            Self::TouchStart => "touchstart",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Returned when an event name is not one of the tracked classes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a tracked activity event: {0}")]
pub struct ParseActivityError(pub String);

impl FromStr for ActivityKind {
    type Err = ParseActivityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_name() == s)
            .ok_or_else(|| ParseActivityError(s.to_owned()))
    }
}

/// Decides whether activity at `now` should be recorded.
///
/// Only when strictly more than `debounce` has passed since the last
/// recorded activity; anything sooner is dropped.
pub(crate) fn throttled_activity(
    state: &SessionState,
    now: Instant,
    debounce: Duration,
) -> Option<SessionAction> {
    (now.saturating_duration_since(state.last_activity) > debounce)
        .then_some(SessionAction::SetActivity(now))
}

/// Feeds interaction events into a running session manager.
///
/// Cheap to clone; hand one to every place that observes input. Once the
/// manager stops, the listener is detached and [`notify`](Self::notify)
/// returns `false`.
#[derive(Debug, Clone)]
pub struct ActivityListener {
    tx: mpsc::Sender<ActivityKind>,
}

impl ActivityListener {
    pub(crate) fn new(tx: mpsc::Sender<ActivityKind>) -> Self {
        Self { tx }
    }

    /// Reports one interaction event. Never blocks.
    ///
    /// Returns `false` if the manager is no longer listening. An event
    /// dropped because the queue is momentarily full still returns `true`.
    pub fn notify(&self, kind: ActivityKind) -> bool {
        match self.tx.try_send(kind) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Reports an event by its DOM name, ignoring untracked events.
    ///
    /// Returns `false` if the event is not tracked or the manager is no
    /// longer listening.
    pub fn notify_event(&self, event_name: &str) -> bool {
        event_name
            .parse::<ActivityKind>()
            .is_ok_and(|kind| self.notify(kind))
    }

    /// Whether the manager is still listening.
    pub fn is_attached(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tracked_event_names() {
        assert_eq!("mousedown".parse::<ActivityKind>(), Ok(ActivityKind::PointerPress));
        assert_eq!("mousemove".parse::<ActivityKind>(), Ok(ActivityKind::PointerMove));
        assert_eq!("keypress".parse::<ActivityKind>(), Ok(ActivityKind::KeyPress));
        assert_eq!("scroll".parse::<ActivityKind>(), Ok(ActivityKind::Scroll));
        assert_eq!("touchstart".parse::<ActivityKind>(), Ok(ActivityKind::TouchStart));
    }

    #[test]
    fn test_parse_untracked_event_fails() {
        let err = "resize".parse::<ActivityKind>().unwrap_err();
        assert_eq!(err, ParseActivityError("resize".into()));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for kind in ActivityKind::ALL {
            assert_eq!(kind.to_string().parse::<ActivityKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_throttle_ignores_within_debounce() {
        let t0 = Instant::now();
        let state = SessionState::initial(t0);
        let debounce = Duration::from_secs(1);

        assert_eq!(throttled_activity(&state, t0, debounce), None);
        assert_eq!(
            throttled_activity(&state, t0 + Duration::from_millis(1000), debounce),
            None,
            "exactly one debounce apart is still too soon"
        );
    }

    #[test]
    fn test_throttle_records_after_debounce() {
        let t0 = Instant::now();
        let state = SessionState::initial(t0);
        let at = t0 + Duration::from_millis(1001);

        assert_eq!(
            throttled_activity(&state, at, Duration::from_secs(1)),
            Some(SessionAction::SetActivity(at))
        );
    }

    #[tokio::test]
    async fn test_listener_detaches_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        let listener = ActivityListener::new(tx);
        assert!(listener.is_attached());
        assert!(listener.notify(ActivityKind::Scroll));
        // Queue full: dropped, but still attached.
        assert!(listener.notify(ActivityKind::Scroll));

        drop(rx);

        assert!(!listener.is_attached());
        assert!(!listener.notify(ActivityKind::KeyPress));
        assert!(!listener.notify_event("keypress"));
    }

    #[tokio::test]
    async fn test_notify_event_rejects_untracked_names() {
        let (tx, mut rx) = mpsc::channel(4);
        let listener = ActivityListener::new(tx);

        assert!(!listener.notify_event("focus"));
        assert!(listener.notify_event("touchstart"));

        assert_eq!(rx.recv().await, Some(ActivityKind::TouchStart));
    }
}
