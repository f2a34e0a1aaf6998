//! Data types shared between Vigil and an authentication service.
//!
//! This crate defines what crosses the boundary between the session
//! manager and the service that actually talks to the backend:
//!
//! - **Types** ([`UserRecord`], [`Credentials`], [`Registration`],
//!   [`GoogleCredential`], [`AvatarUpload`], [`PasswordChange`],
//!   [`SessionPayload`], [`ServiceResponse`]): what gets sent and what
//!   comes back.
//! - **Status codes** ([`status`]): the HTTP-style codes the session
//!   manager interprets.
//! - **Errors** ([`ServiceError`]): what can go wrong before a response
//!   even exists (network failure, timeout, malformed body).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about timers or session state. It only
//! describes the shape of requests and responses.
//!
//! ```text
//! Auth service (network) → Protocol (ServiceResponse) → Session (state machine)
//! ```

mod error;
mod types;

pub use error::ServiceError;
pub use types::{
    status, AvatarUpload, Credentials, GoogleCredential, PasswordChange, Registration,
    ServiceResponse, SessionPayload, UserRecord,
};
