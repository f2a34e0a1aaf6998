//! Unified error type for Vigil.

use vigil_protocol::ServiceError;
use vigil_session::SessionError;

use crate::config::ConfigError;

/// Top-level error that wraps the errors of every Vigil crate.
///
/// Each variant converts with `#[from]`, so `?` works on sub-crate
/// results inside functions returning `Result<_, VigilError>`.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// A session operation failed (rejected login, refresh abandoned...).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The auth service could not be reached or answered nonsense.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The configuration file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
