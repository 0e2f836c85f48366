//! Alpaca WebSocket Authentication
//!
//! Handles the authentication handshake on the market data stream. Alpaca
//! terminates connections that do not authenticate within 10 seconds.
//!
//! # Authentication Flow
//!
//! 1. Connect to WebSocket endpoint
//! 2. Receive `{"T":"success","msg":"connected"}` from server
//! 3. Send `{"action":"auth","key":"...","secret":"..."}`
//! 4. Receive `{"T":"success","msg":"authenticated"}` or an error
//!
//! # Error Codes
//!
//! - 401: Not authenticated
//! - 402: Authentication failed (invalid credentials)
//! - 403: Already authenticated
//! - 404: Authentication timeout (>10 seconds)
//!
//! # References
//!
//! - [Stock Streaming Auth](https://docs.alpaca.markets/docs/streaming-market-data)

use std::time::Duration;

use thiserror::Error;

use super::messages::{AuthRequest, ErrorMessage, SuccessKind, SuccessMessage};

// =============================================================================
// Constants
// =============================================================================

/// Maximum time allowed for authentication after connection.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Not authenticated (must authenticate before subscribing).
    #[error("not authenticated: must authenticate before making requests")]
    NotAuthenticated,

    /// Authentication failed (invalid credentials).
    #[error("authentication failed: invalid API key or secret")]
    InvalidCredentials,

    /// Already authenticated (connection was already authenticated).
    #[error("already authenticated: connection is already authenticated")]
    AlreadyAuthenticated,

    /// Authentication timeout (took longer than 10 seconds).
    #[error("authentication timeout: must authenticate within 10 seconds")]
    Timeout,

    /// Connection limit exceeded.
    #[error("connection limit exceeded: too many concurrent connections")]
    ConnectionLimitExceeded,

    /// Invalid credentials configuration.
    #[error("invalid credentials: {0}")]
    InvalidConfig(String),

    /// Unexpected error from server.
    #[error("server error ({code}): {message}")]
    ServerError {
        /// Error code from server
        code: i32,
        /// Error message from server
        message: String,
    },
}

impl From<&ErrorMessage> for AuthError {
    fn from(err: &ErrorMessage) -> Self {
        match err.code {
            401 => Self::NotAuthenticated,
            402 => Self::InvalidCredentials,
            403 => Self::AlreadyAuthenticated,
            404 => Self::Timeout,
            406 => Self::ConnectionLimitExceeded,
            code => Self::ServerError {
                code,
                message: err.msg.clone(),
            },
        }
    }
}

// =============================================================================
// Authentication State
// =============================================================================

/// Current state of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Not yet connected or authentication not started.
    #[default]
    Disconnected,

    /// Connected but not authenticated.
    Connected,

    /// Authentication request sent, awaiting response.
    Authenticating,

    /// Successfully authenticated.
    Authenticated,

    /// Authentication failed.
    Failed,
}

impl AuthState {
    /// Check if currently authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Check if ready to authenticate (connected but not yet authenticated).
    #[must_use]
    pub const fn can_authenticate(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Alpaca API credentials.
///
/// The `Debug` and `Display` implementations redact the secret for safe
/// logging.
#[derive(Clone)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either key or secret is empty.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Result<Self, AuthError> {
        let key = key.into();
        let secret = secret.into();

        if key.is_empty() {
            return Err(AuthError::InvalidConfig("API key cannot be empty".to_string()));
        }
        if secret.is_empty() {
            return Err(AuthError::InvalidConfig(
                "API secret cannot be empty".to_string(),
            ));
        }

        Ok(Self { key, secret })
    }

    /// Get the API key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the API secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Create an authentication request for the stream.
    #[must_use]
    pub fn to_auth_request(&self) -> AuthRequest {
        AuthRequest::new(self.key.clone(), self.secret.clone())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Display for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials(key={})", self.key)
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Authentication state machine for one connection epoch.
///
/// Tracks the handshake state and turns server control messages into state
/// transitions. Reset at the start of every new connection.
#[derive(Debug)]
pub struct AuthHandler {
    credentials: Credentials,
    state: AuthState,
}

impl AuthHandler {
    /// Create a new authentication handler.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Disconnected,
        }
    }

    /// Get the current authentication state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Check if currently authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    /// Create the authentication request and mark the handshake in flight.
    #[must_use]
    pub fn create_auth_request(&mut self) -> AuthRequest {
        self.state = AuthState::Authenticating;
        self.credentials.to_auth_request()
    }

    /// Process a success message from the server.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if authentication is now complete
    /// - `Ok(false)` if this was the connection ack (send auth next)
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps the call site uniform with
    /// [`Self::on_error`].
    pub const fn on_success(&mut self, msg: &SuccessMessage) -> Result<bool, AuthError> {
        match msg.msg {
            SuccessKind::Connected => {
                self.state = AuthState::Connected;
                Ok(false)
            }
            SuccessKind::Authenticated => {
                self.state = AuthState::Authenticated;
                Ok(true)
            }
        }
    }

    /// Process an error message from the server.
    ///
    /// Returns the corresponding `AuthError` and marks the handshake failed.
    pub fn on_error(&mut self, msg: &ErrorMessage) -> AuthError {
        self.state = AuthState::Failed;
        AuthError::from(msg)
    }

    /// Reset to disconnected state (after connection close).
    pub const fn reset(&mut self) {
        self.state = AuthState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_new() {
        let creds = Credentials::new("my_key", "my_secret").unwrap();
        assert_eq!(creds.key(), "my_key");
        assert_eq!(creds.secret(), "my_secret");
    }

    #[test]
    fn credentials_empty_key_fails() {
        assert!(Credentials::new("", "secret").is_err());
    }

    #[test]
    fn credentials_empty_secret_fails() {
        assert!(Credentials::new("key", "").is_err());
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials::new("my_key", "super_secret").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("my_key"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret"));
    }

    #[test]
    fn auth_state_transitions() {
        let mut state = AuthState::Disconnected;
        assert!(!state.is_authenticated());
        assert!(!state.can_authenticate());

        state = AuthState::Connected;
        assert!(state.can_authenticate());

        state = AuthState::Authenticated;
        assert!(state.is_authenticated());
    }

    #[test]
    fn handler_full_handshake() {
        let creds = Credentials::new("key", "secret").unwrap();
        let mut handler = AuthHandler::new(creds);

        assert_eq!(handler.state(), AuthState::Disconnected);

        let connected = SuccessMessage {
            msg_type: "success".to_string(),
            msg: SuccessKind::Connected,
        };
        assert!(!handler.on_success(&connected).unwrap());
        assert_eq!(handler.state(), AuthState::Connected);

        let req = handler.create_auth_request();
        assert_eq!(req.action, "auth");
        assert_eq!(handler.state(), AuthState::Authenticating);

        let authenticated = SuccessMessage {
            msg_type: "success".to_string(),
            msg: SuccessKind::Authenticated,
        };
        assert!(handler.on_success(&authenticated).unwrap());
        assert!(handler.is_authenticated());
    }

    #[test]
    fn handler_on_error_marks_failed() {
        let creds = Credentials::new("key", "secret").unwrap();
        let mut handler = AuthHandler::new(creds);

        let error_msg = ErrorMessage {
            msg_type: "error".to_string(),
            code: 402,
            msg: "auth failed".to_string(),
        };

        let err = handler.on_error(&error_msg);
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(handler.state(), AuthState::Failed);
    }

    #[test]
    fn auth_error_from_error_message() {
        let test_cases = [
            (401, AuthError::NotAuthenticated),
            (402, AuthError::InvalidCredentials),
            (403, AuthError::AlreadyAuthenticated),
            (404, AuthError::Timeout),
            (406, AuthError::ConnectionLimitExceeded),
        ];

        for (code, expected) in test_cases {
            let msg = ErrorMessage {
                msg_type: "error".to_string(),
                code,
                msg: "test".to_string(),
            };
            let err = AuthError::from(&msg);
            assert_eq!(
                std::mem::discriminant(&err),
                std::mem::discriminant(&expected)
            );
        }
    }

    #[test]
    fn handler_reset() {
        let creds = Credentials::new("key", "secret").unwrap();
        let mut handler = AuthHandler::new(creds);

        let _ = handler.create_auth_request();
        handler.reset();
        assert_eq!(handler.state(), AuthState::Disconnected);
    }
}
