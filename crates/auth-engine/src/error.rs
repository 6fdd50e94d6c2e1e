//! Authentication error types.

use crate::codes::{DialogErrorCode, SsoErrorCode};
use crate::host::IdpError;
use thiserror::Error;

/// Fallback message for internal failures that carry no remedy of their own.
pub const GENERIC_SIGN_IN_MESSAGE: &str =
    "Something went wrong while signing you in. Please try again.";

/// Message shown when the session must be re-established interactively.
pub const SIGN_IN_REQUIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

/// Host SSO failure the user can act on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("SSO failed with code {code}: {message}")]
pub struct PrimaryAuthError {
    pub code: SsoErrorCode,
    pub message: String,
}

/// Dialog lifecycle failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Sign-in dialog failed with code {code}: {message}")]
pub struct FallbackAuthError {
    pub code: DialogErrorCode,
    pub message: String,
}

impl FallbackAuthError {
    pub fn new(code: DialogErrorCode) -> Self {
        Self {
            code,
            message: code.remedy().to_string(),
        }
    }
}

/// Access token could not be turned into an identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Token is not a three-part JWT")]
    Malformed,

    #[error("Token payload is not valid base64url: {0}")]
    Base64(String),

    #[error("Token claims are not valid JSON: {0}")]
    Claims(String),

    #[error("Token has neither an object id nor a subject claim")]
    MissingSubject,

    #[error("Token rejected: {0}")]
    Rejected(String),
}

/// The one error kind shown to the user verbatim.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct AuthenticationError {
    pub message: String,
    pub code: Option<String>,
    /// Retrying the same operation may succeed; the UI offers a retry.
    pub retryable: bool,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl AuthenticationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retryable: false,
            cause: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// Internal authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// SSO failure with a user remedy
    #[error(transparent)]
    Primary(#[from] PrimaryAuthError),

    /// Dialog lifecycle failure
    #[error(transparent)]
    Fallback(#[from] FallbackAuthError),

    /// Token decoding failure
    #[error("Failed to decode access token: {0}")]
    Decode(#[from] DecodeError),

    /// Identity-provider client failure
    #[error("Identity provider error: {0}")]
    IdentityProvider(#[from] IdpError),

    /// Login dialog reported an error payload
    #[error("Sign-in failed: {0}")]
    DialogReported(String),

    /// Login dialog posted something that is not a completion envelope
    #[error("Invalid sign-in dialog message: {0}")]
    InvalidDialogMessage(String),

    /// A dialog is already open for this authenticator
    #[error("A sign-in dialog is already open")]
    DialogAlreadyOpen,

    /// The primary channel can no longer produce tokens for this session
    #[error("Sign-in required")]
    SignInRequired,

    /// Invalid state transition in the session FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Redirect handshake error in the login route
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] addin_storage::StorageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Already user-facing
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
}

impl AuthError {
    /// Wrap into the user-facing kind, keeping `self` as the cause.
    pub fn into_user_facing(self) -> AuthenticationError {
        let retryable = self.is_transient();
        let mut surfaced = match self {
            AuthError::Authentication(err) => err,
            AuthError::Primary(err) => {
                let message = err.code.remedy().unwrap_or(GENERIC_SIGN_IN_MESSAGE);
                AuthenticationError::new(message)
                    .with_code(err.code.machine_code())
                    .with_cause(err)
            }
            AuthError::Fallback(err) => AuthenticationError::new(err.message.clone())
                .with_code(err.code.machine_code())
                .with_cause(err),
            AuthError::DialogReported(message) => {
                AuthenticationError::new(message).with_code("dialog_error")
            }
            AuthError::SignInRequired => AuthenticationError::new(SIGN_IN_REQUIRED_MESSAGE)
                .with_code("sign_in_required")
                .with_cause(AuthError::SignInRequired),
            AuthError::IdentityProvider(IdpError::ConsentRequired) => {
                AuthenticationError::new(SIGN_IN_REQUIRED_MESSAGE)
                    .with_code("consent_required")
                    .with_cause(IdpError::ConsentRequired)
            }
            AuthError::DialogAlreadyOpen => {
                AuthenticationError::new(DialogErrorCode::DialogAlreadyOpen.remedy())
                    .with_code(DialogErrorCode::DialogAlreadyOpen.machine_code())
                    .with_cause(AuthError::DialogAlreadyOpen)
            }
            other => AuthenticationError::new(GENERIC_SIGN_IN_MESSAGE).with_cause(other),
        };
        surfaced.retryable |= retryable;
        surfaced
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Timeout => true,
            AuthError::Primary(err) => err.code == SsoErrorCode::OperationAlreadyPending,
            AuthError::Fallback(err) => err.code == DialogErrorCode::CannotLoadPage,
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_primary_error_uses_remedy_and_code() {
        let err = AuthError::Primary(PrimaryAuthError {
            code: SsoErrorCode::NotSignedIn,
            message: "host said no".to_string(),
        })
        .into_user_facing();

        assert_eq!(err.code.as_deref(), Some("sso_13001"));
        assert_eq!(Some(err.message.as_str()), SsoErrorCode::NotSignedIn.remedy());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_fallback_error_uses_remedy_and_code() {
        let err = AuthError::Fallback(FallbackAuthError::new(DialogErrorCode::CannotLoadPage))
            .into_user_facing();
        assert_eq!(err.code.as_deref(), Some("dialog_12002"));
        assert_eq!(err.message, DialogErrorCode::CannotLoadPage.remedy());
        assert!(err.retryable);
    }

    #[test]
    fn test_dialog_reported_message_is_shown_verbatim() {
        let err = AuthError::DialogReported("AADSTS50011: redirect mismatch".to_string())
            .into_user_facing();
        assert_eq!(err.message, "AADSTS50011: redirect mismatch");
    }

    #[test]
    fn test_internal_errors_get_generic_message_with_cause() {
        let err = AuthError::Decode(DecodeError::Malformed).into_user_facing();
        assert_eq!(err.message, GENERIC_SIGN_IN_MESSAGE);
        assert!(!err.retryable);
        assert!(err.code.is_none());
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("Failed to decode access token: Token is not a three-part JWT".to_string())
        );
    }

    #[test]
    fn test_user_facing_passes_through() {
        let original = AuthenticationError::new("already wrapped").with_code("x");
        let err = AuthError::from(original).into_user_facing();
        assert_eq!(err.message, "already wrapped");
        assert_eq!(err.code.as_deref(), Some("x"));
    }

    #[test]
    fn test_consent_required_asks_for_sign_in() {
        let err = AuthError::IdentityProvider(IdpError::ConsentRequired).into_user_facing();
        assert_eq!(err.message, SIGN_IN_REQUIRED_MESSAGE);
        assert_eq!(err.code.as_deref(), Some("consent_required"));
    }

    #[test]
    fn test_is_transient() {
        assert!(AuthError::Timeout.is_transient());
        assert!(AuthError::Primary(PrimaryAuthError {
            code: SsoErrorCode::OperationAlreadyPending,
            message: String::new(),
        })
        .is_transient());
        assert!(!AuthError::Decode(DecodeError::MissingSubject).is_transient());
        assert!(!AuthError::DialogAlreadyOpen.is_transient());
    }
}
