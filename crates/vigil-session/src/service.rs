//! The auth service hook: the network calls the session manager relies on.
//!
//! Vigil doesn't talk to a backend itself. The application provides an
//! [`AuthService`] (an HTTP client against its API, a mock in tests, an
//! in-memory fake in a demo) and the session manager decides *when* to
//! call it and *what the answer means*.
//!
//! Every method returns the raw [`ServiceResponse`]: interpreting status
//! codes is the session layer's job, so implementations stay thin.

use std::future::Future;

use serde_json::Value;
use vigil_protocol::{
    AvatarUpload, Credentials, GoogleCredential, PasswordChange, Registration, ServiceError,
    ServiceResponse,
};

/// The external authentication collaborator.
///
/// # Trait bounds
///
/// - `Send + Sync` → the service is shared between the caller's tasks and
///   the manager's background task.
/// - `'static` → it lives as long as the manager.
///
/// Only the first five methods are required. The rest default to
/// [`ServiceError::Unsupported`], so a backend without, say, Google
/// sign-in simply reports it as such.
///
/// Session credentials (cookies, bearer tokens) are the service's own
/// business: none of the methods take a token, the service is expected to
/// carry whatever the last login or refresh gave it.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use vigil_protocol::{Credentials, Registration, ServiceError, ServiceResponse};
/// use vigil_session::AuthService;
///
/// /// Lets everybody in. Only for demos.
/// struct OpenDoor;
///
/// impl AuthService for OpenDoor {
///     async fn get_user(&self) -> Result<ServiceResponse, ServiceError> {
///         Ok(ServiceResponse::ok(json!({ "username": "guest" })))
///     }
///     async fn login(&self, _: &Credentials) -> Result<ServiceResponse, ServiceError> {
///         Ok(ServiceResponse::ok(json!({})))
///     }
///     async fn register(&self, _: &Registration) -> Result<ServiceResponse, ServiceError> {
///         Ok(ServiceResponse::new(201, json!({})))
///     }
///     async fn refresh_token(&self) -> Result<ServiceResponse, ServiceError> {
///         Ok(ServiceResponse::ok(json!({})))
///     }
///     async fn logout(&self) -> Result<ServiceResponse, ServiceError> {
///         Ok(ServiceResponse::ok(json!({})))
///     }
/// }
/// ```
pub trait AuthService: Send + Sync + 'static {
    /// Fetches the current user. `200` with the user record in the body
    /// means a session exists.
    fn get_user(
        &self,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send;

    /// Signs in. `200` on success.
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send;

    /// Creates an account (and signs in). `201` on success.
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send;

    /// Renews the session token without credentials. `200` on success.
    fn refresh_token(
        &self,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send;

    /// Ends the session server-side. `200` on success.
    fn logout(
        &self,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send;

    /// Applies a partial update to the current user. `200` with the
    /// updated record on success.
    ///
    /// Default: unsupported.
    fn update_user(
        &self,
        _changes: &Value,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send {
        async { Err(ServiceError::Unsupported("update_user")) }
    }

    /// Deletes the current user's account. `200` on success.
    ///
    /// Default: unsupported.
    fn delete_account(
        &self,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send {
        async { Err(ServiceError::Unsupported("delete_account")) }
    }

    /// Exchanges a Google identity token for a session. `200` on success.
    ///
    /// Default: unsupported.
    fn google_auth(
        &self,
        _credential: &GoogleCredential,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send {
        async { Err(ServiceError::Unsupported("google_auth")) }
    }

    /// Cheap "is anyone signed in?" check that skips loading the user
    /// record. `200` if a session exists, `401` if not.
    ///
    /// Default: unsupported.
    fn check_session(
        &self,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send {
        async { Err(ServiceError::Unsupported("check_session")) }
    }

    /// Replaces the current user's profile picture. `200` with the updated
    /// user record on success.
    ///
    /// Default: unsupported.
    fn update_avatar(
        &self,
        _avatar: &AvatarUpload,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send {
        async { Err(ServiceError::Unsupported("update_avatar")) }
    }

    /// Changes the current user's password. `200` on success.
    ///
    /// Default: unsupported.
    fn change_password(
        &self,
        _change: &PasswordChange,
    ) -> impl Future<Output = Result<ServiceResponse, ServiceError>> + Send {
        async { Err(ServiceError::Unsupported("change_password")) }
    }
}
