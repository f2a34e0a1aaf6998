//! # Vigil
//!
//! Client-side authentication session management.
//!
//! Vigil keeps track of who is signed in, renews the session token on a
//! fixed interval, and signs the user out after a stretch of inactivity.
//! Applications implement a single [`AuthService`] trait (the network
//! calls) and the framework decides when to make them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vigil::prelude::*;
//!
//! # async fn run<S: AuthService>(service: S) -> Result<(), VigilError> {
//! vigil::telemetry::init_tracing("info");
//! let config = vigil::config::load_config("session.json")?;
//!
//! let manager = SessionManager::new(service, config);
//! manager.start()?;
//! manager.login(&Credentials::new("ana", "secret")).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod telemetry;

pub use error::VigilError;

/// Re-exports of everything an application typically needs.
pub mod prelude {
    pub use crate::VigilError;
    pub use vigil_protocol::{
        AvatarUpload, Credentials, GoogleCredential, PasswordChange, Registration, ServiceError,
        ServiceResponse, SessionPayload, UserRecord, status,
    };
    pub use vigil_session::{
        ActivityKind, ActivityListener, AuthService, SessionConfig, SessionError,
        SessionManager, SessionPhase, SessionState,
    };
}

pub use vigil_protocol as protocol;
pub use vigil_session as session;
pub use vigil_timer as timer;
