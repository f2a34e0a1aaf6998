//! Error types for the protocol layer.
//!
//! A [`ServiceError`] means the auth service could not produce a
//! response at all. A response with a non-success status is NOT an error
//! at this layer; it is a perfectly good [`ServiceResponse`](crate::ServiceResponse)
//! that the session layer interprets.

/// Errors raised by an auth service call before a response was obtained.
///
/// `Clone` is required: one failed refresh is delivered to every caller
/// that was waiting on it, and each of them gets its own copy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The request never reached the server, or the connection broke.
    #[error("{0}")]
    Transport(String),

    /// The call did not complete within the configured request timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered, but the body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The service implementation does not provide this operation.
    #[error("operation not supported by this auth service: {0}")]
    Unsupported(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_displays_raw_message() {
        // Transport messages are surfaced to users verbatim, so no prefix.
        let err = ServiceError::Transport("connection refused".into());
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn test_unsupported_names_operation() {
        let err = ServiceError::Unsupported("delete_account");
        assert!(err.to_string().contains("delete_account"));
    }
}
