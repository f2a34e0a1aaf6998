//! Session timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for session behavior.
///
/// Timeouts are plain integers (seconds or milliseconds, as the field
/// name says) so the config reads naturally from a JSON file. Missing
/// fields fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How often the token is refreshed while signed in.
    ///
    /// Default: 240 seconds.
    pub refresh_interval_secs: u64,

    /// How long a signed-in session may go without real user activity
    /// before it is logged out.
    ///
    /// Default: 1800 seconds (30 minutes).
    pub inactivity_timeout_secs: u64,

    /// Minimum gap between two recorded activity events. Events arriving
    /// sooner are ignored.
    ///
    /// Default: 1000 ms.
    pub activity_debounce_ms: u64,

    /// Upper bound on every auth service call. 0 disables the bound.
    ///
    /// Default: 30 seconds.
    pub request_timeout_secs: u64,

    /// Random delay (0..=max) added to the first refresh after sign-in.
    ///
    /// Default: 0 (no jitter).
    pub refresh_jitter_ms: u64,

    /// Capacity of the activity event queue. Events that do not fit are
    /// dropped, which is harmless since they are throttled anyway.
    ///
    /// Default: 256.
    pub activity_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 240,
            inactivity_timeout_secs: 1800,
            activity_debounce_ms: 1000,
            request_timeout_secs: 30,
            refresh_jitter_ms: 0,
            activity_buffer: 256,
        }
    }
}

impl SessionConfig {
    /// Fix values that would make the manager misbehave.
    ///
    /// - `refresh_interval_secs` and `inactivity_timeout_secs` of 0 become 1.
    /// - `activity_buffer` of 0 becomes 1.
    pub fn validated(mut self) -> Self {
        if self.refresh_interval_secs == 0 {
            warn!("refresh_interval_secs is 0, using 1");
            self.refresh_interval_secs = 1;
        }
        if self.inactivity_timeout_secs == 0 {
            warn!("inactivity_timeout_secs is 0, using 1");
            self.inactivity_timeout_secs = 1;
        }
        if self.activity_buffer == 0 {
            warn!("activity_buffer is 0, using 1");
            self.activity_buffer = 1;
        }
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn activity_debounce(&self) -> Duration {
        Duration::from_millis(self.activity_debounce_ms)
    }

    /// `None` when request timeouts are disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0)
            .then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn refresh_jitter(&self) -> Duration {
        Duration::from_millis(self.refresh_jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(240));
        assert_eq!(config.inactivity_timeout(), Duration::from_secs(1800));
        assert_eq!(config.activity_debounce(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.refresh_jitter(), Duration::ZERO);
    }

    #[test]
    fn test_request_timeout_zero_disables() {
        let config = SessionConfig {
            request_timeout_secs: 0,
            ..SessionConfig::default()
        };
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_validated_fixes_zero_values() {
        let config = SessionConfig {
            refresh_interval_secs: 0,
            inactivity_timeout_secs: 0,
            activity_buffer: 0,
            ..SessionConfig::default()
        }
        .validated();
        assert_eq!(config.refresh_interval_secs, 1);
        assert_eq!(config.inactivity_timeout_secs, 1);
        assert_eq!(config.activity_buffer, 1);
    }

    #[test]
    fn test_partial_json_uses_defaults_for_missing_fields() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "inactivity_timeout_secs": 600 }"#)
                .expect("valid config");
        assert_eq!(config.inactivity_timeout_secs, 600);
        assert_eq!(config.refresh_interval_secs, 240);
    }
}
