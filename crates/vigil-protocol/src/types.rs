//! Request and response types exchanged with the auth service.
//!
//! The session manager treats user records and session payloads as
//! opaque JSON: it stores them and hands them back, but never looks
//! inside. Only the response *status* and, on failure, the error message
//! in the body carry meaning for the session layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

/// HTTP-style status codes the session layer interprets.
///
/// Only a handful matter: each operation has exactly one success code,
/// and everything else is a failure.
pub mod status {
    /// Success for every call except `register`.
    pub const OK: u16 = 200;
    /// Success for `register` (a new account was created).
    pub const CREATED: u16 = 201;
    /// Validation failure reported by the server.
    pub const BAD_REQUEST: u16 = 400;
    /// Missing, invalid or expired credentials.
    pub const UNAUTHORIZED: u16 = 401;
}

/// Body fields that may carry a human-readable error message, in the
/// order they are consulted.
const MESSAGE_FIELDS: [&str; 4] = ["erro", "error", "detail", "message"];

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The authenticated user's identity record, exactly as the service
/// returned it.
///
/// `#[serde(transparent)]` serializes this as the inner JSON value, not
/// as `{ "0": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRecord(pub Value);

impl UserRecord {
    /// Returns a top-level string field of the record, if present.
    ///
    /// Handy for logging (`user.field("email")`) without committing the
    /// session layer to any particular user schema.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}

/// Whatever the service returns from a successful login, registration or
/// token refresh (tokens, expiry hints, and so on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionPayload(pub Value);

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Login credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Passwords never end up in logs, even at `trace` level.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Data for creating a new account.
///
/// Anything beyond the three common fields goes into `extra` and is
/// flattened into the same JSON object on the wire.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Registration {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            extra: Map::new(),
        }
    }

    /// Adds an extra field to the registration body.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("extra", &self.extra)
            .finish()
    }
}

/// An identity token issued by Google Sign-In, to be exchanged for a
/// session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleCredential {
    pub credential: String,
}

impl GoogleCredential {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
        }
    }
}

impl fmt::Debug for GoogleCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCredential")
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// A new profile picture for the current user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl AvatarUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// Prints the size instead of the image bytes.
impl fmt::Debug for AvatarUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvatarUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A password change for the signed-in user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn new(current_password: impl Into<String>, new_password: impl Into<String>) -> Self {
        Self {
            current_password: current_password.into(),
            new_password: new_password.into(),
        }
    }
}

impl fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordChange")
            .field("current_password", &"<redacted>")
            .field("new_password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A response from the auth service: a status code plus a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub status: u16,
    #[serde(default)]
    pub body: Value,
}

impl ServiceResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// A `200 OK` response with the given body.
    pub fn ok(body: Value) -> Self {
        Self::new(status::OK, body)
    }

    /// Returns `true` if the response carries the expected success code.
    pub fn is(&self, expected: u16) -> bool {
        self.status == expected
    }

    /// Extracts the server-provided error message, if any.
    ///
    /// Looks at `erro`, `error`, `detail` and `message` in that order.
    /// A field may hold a string or a list of strings (validation errors
    /// commonly come back as lists); for a list the first entry wins.
    pub fn error_message(&self) -> Option<String> {
        MESSAGE_FIELDS.iter().find_map(|name| match self.body.get(name)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Array(items) => items
                .iter()
                .find_map(Value::as_str)
                .map(str::to_owned),
            _ => None,
        })
    }

    /// Consumes the response, returning the body as a user record.
    pub fn into_user(self) -> UserRecord {
        UserRecord(self.body)
    }

    /// Consumes the response, returning the body as a session payload.
    pub fn into_payload(self) -> SessionPayload {
        SessionPayload(self.body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_error_message_prefers_erro_field() {
        let resp = ServiceResponse::new(
            status::UNAUTHORIZED,
            json!({ "erro": "invalid credentials", "detail": "other" }),
        );
        assert_eq!(resp.error_message().as_deref(), Some("invalid credentials"));
    }

    #[test]
    fn test_error_message_falls_back_to_detail() {
        let resp = ServiceResponse::new(
            status::UNAUTHORIZED,
            json!({ "detail": "token expired" }),
        );
        assert_eq!(resp.error_message().as_deref(), Some("token expired"));
    }

    #[test]
    fn test_error_message_takes_first_entry_of_list() {
        let resp = ServiceResponse::new(
            status::BAD_REQUEST,
            json!({ "error": ["username taken", "email taken"] }),
        );
        assert_eq!(resp.error_message().as_deref(), Some("username taken"));
    }

    #[test]
    fn test_error_message_none_without_known_fields() {
        let resp = ServiceResponse::new(500, json!({ "code": 17 }));
        assert_eq!(resp.error_message(), None);

        let empty = ServiceResponse::new(500, Value::Null);
        assert_eq!(empty.error_message(), None);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("ana", "hunter2");
        let printed = format!("{creds:?}");
        assert!(printed.contains("ana"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_secret_requests_debug_redacted() {
        let google = format!("{:?}", GoogleCredential::new("eyJhbGciOi.secret"));
        assert!(!google.contains("secret"));

        let change = format!("{:?}", PasswordChange::new("old-pw", "new-pw"));
        assert!(!change.contains("old-pw"));
        assert!(!change.contains("new-pw"));
    }

    #[test]
    fn test_avatar_debug_shows_size_only() {
        let avatar = AvatarUpload::new("me.png", "image/png", vec![0x89, b'P', b'N', b'G']);
        let printed = format!("{avatar:?}");
        assert!(printed.contains("me.png"));
        assert!(printed.contains("bytes: 4"));
    }

    #[test]
    fn test_registration_flattens_extra_fields() {
        let reg = Registration::new("ana", "ana@example.com", "pw")
            .with_field("name", "Ana");
        let value = serde_json::to_value(&reg).expect("serializable");
        assert_eq!(value["name"], "Ana");
        assert_eq!(value["email"], "ana@example.com");
        assert!(value.get("extra").is_none());
    }

    #[test]
    fn test_user_record_is_transparent() {
        let user = UserRecord(json!({ "email": "ana@example.com" }));
        let value = serde_json::to_value(&user).expect("serializable");
        assert_eq!(value, json!({ "email": "ana@example.com" }));
        assert_eq!(user.field("email"), Some("ana@example.com"));
        assert_eq!(user.field("missing"), None);
    }

    #[test]
    fn test_service_response_body_defaults_to_null() {
        let resp: ServiceResponse =
            serde_json::from_str(r#"{ "status": 204 }"#).expect("valid json");
        assert_eq!(resp.status, 204);
        assert_eq!(resp.body, Value::Null);
        assert!(!resp.is(status::OK));
    }
}
