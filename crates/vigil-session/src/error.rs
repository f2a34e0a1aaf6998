//! Error types for the session layer.

use vigil_protocol::ServiceError;

/// Errors returned by session operations.
///
/// `Clone` because a single refresh outcome is handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The service answered with something other than the expected
    /// success status. `message` is the server's explanation when it gave
    /// one, otherwise a generic description of the failed operation.
    ///
    /// Displays as the bare message, since this is what ends up in front
    /// of the user.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The service could not produce a response at all.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The refresh this caller was waiting on was cancelled before it
    /// completed (the manager was stopped mid-flight).
    #[error("refresh abandoned before completion")]
    RefreshAbandoned,

    /// `start()` was called on a manager that is already running.
    #[error("session manager already started")]
    AlreadyStarted,
}

impl SessionError {
    /// The HTTP-style status of a rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
