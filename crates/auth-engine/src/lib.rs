//! Add-in authentication.
//!
//! - [`PrimaryAuthenticator`]: host single sign-on behind a single-flight [`TokenCache`]
//! - [`FallbackAuthenticator`]: login dialog with a typed completion envelope
//! - [`AuthenticationSession`]: strategy selection, identity and `get_token()`
//! - [`LoginRoute`]: the page running inside the dialog

mod auth_fsm;
mod codes;
mod completion;
mod error;
mod fallback;
mod host;
mod identity;
mod login_route;
mod oauth;
mod primary;
mod session;
mod token_cache;

pub use auth_fsm::{
    AuthMachine, AuthMachineInput, AuthMachineState, AuthState, AuthStateChangedPayload,
    AuthStrategy, DialogMachine, DialogMachineInput, DialogMachineState, DialogState,
    SessionState,
};
pub use codes::{DialogErrorCode, SsoDisposition, SsoErrorCode};
pub use completion::{error_text, DialogCompletion};
pub use error::{
    AuthError, AuthResult, AuthenticationError, DecodeError, FallbackAuthError,
    PrimaryAuthError, GENERIC_SIGN_IN_MESSAGE, SIGN_IN_REQUIRED_MESSAGE,
};
pub use fallback::{FallbackAuthenticator, FallbackConfig, FallbackOutcome, FallbackSession};
pub use host::{
    Account, DialogChannel, DialogCloser, DialogEvent, DialogHost, DialogHostError, DialogSize,
    IdentityProvider, IdpError, SsoError, SsoHost, SsoTokenOptions,
};
pub use identity::{decode_claims, AcceptAllVerifier, Identity, IdentityDecoder, TokenVerifier};
pub use login_route::{
    CallbackServerHandshake, DialogContext, HandshakeTokens, LoginRoute, LoginRouteOutcome,
    RedirectHandshake,
};
pub use oauth::{
    CallbackListener, OAuthCallbackServer, OAuthResult, DEFAULT_OAUTH_PORT,
    DEFAULT_OAUTH_TIMEOUT_SECS,
};
pub use primary::{PrimaryAuthenticator, PrimaryOutcome};
pub use session::{AuthStateCallback, AuthenticationSession};
pub use token_cache::{CachedToken, TokenCache};
