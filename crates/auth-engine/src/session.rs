//! Authentication session with FSM-based state management.
//!
//! `AuthenticationSession` tries the host's SSO channel first. When the host
//! cannot issue a token the session switches to the fallback strategy and the
//! UI drives [`AuthenticationSession::sign_in_with_dialog`]. Callers fetch
//! tokens through [`AuthenticationSession::get_token`], which dispatches on
//! the strategy that established the session.
//!
//! Every error leaving this type is an [`AuthenticationError`]; the most
//! recent one is kept for display in [`AuthenticationSession::last_error`].

use crate::auth_fsm::{
    AuthMachine, AuthMachineInput, AuthState, AuthStateChangedPayload, AuthStrategy, SessionState,
};
use crate::error::{AuthError, AuthResult, AuthenticationError};
use crate::fallback::{FallbackAuthenticator, FallbackOutcome};
use crate::host::{IdentityProvider, IdpError};
use crate::identity::{Identity, IdentityDecoder};
use crate::primary::{PrimaryAuthenticator, PrimaryOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

#[derive(Debug, Default)]
struct SessionData {
    identity: Option<Identity>,
    strategy: AuthStrategy,
    last_error: Option<String>,
}

/// Session owner: identity, strategy and the token entry point.
pub struct AuthenticationSession {
    primary: PrimaryAuthenticator,
    fallback: FallbackAuthenticator,
    identity_provider: Arc<dyn IdentityProvider>,
    decoder: IdentityDecoder,
    fallback_scopes: Vec<String>,
    fsm: Mutex<AuthMachine>,
    data: Mutex<SessionData>,
    state_callback: Mutex<Option<AuthStateCallback>>,
}

impl AuthenticationSession {
    pub fn new(
        primary: PrimaryAuthenticator,
        fallback: FallbackAuthenticator,
        identity_provider: Arc<dyn IdentityProvider>,
        decoder: IdentityDecoder,
        fallback_scopes: Vec<String>,
    ) -> Self {
        Self {
            primary,
            fallback,
            identity_provider,
            decoder,
            fallback_scopes,
            fsm: Mutex::new(AuthMachine::new()),
            data: Mutex::new(SessionData::default()),
            state_callback: Mutex::new(None),
        }
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState::from(self.fsm.lock().state())
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_state().is_authenticated()
    }

    /// True while a primary attempt or a dialog is in progress.
    pub fn is_authenticating(&self) -> bool {
        self.auth_state().is_transient() || self.fallback.is_authenticating()
    }

    pub fn user(&self) -> Option<Identity> {
        self.data.lock().identity.clone()
    }

    pub fn strategy(&self) -> AuthStrategy {
        self.data.lock().strategy
    }

    pub fn session_state(&self) -> SessionState {
        SessionState {
            is_authenticated: self.is_authenticated(),
            strategy: self.strategy(),
        }
    }

    /// Message of the most recent user-facing error.
    pub fn last_error(&self) -> Option<String> {
        self.data.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.data.lock().last_error = None;
    }

    /// Try to establish the session through host SSO.
    ///
    /// Escalation is not an error: the session switches to the fallback
    /// strategy and stays unauthenticated until the dialog completes.
    pub async fn start(&self) -> Result<SessionState, AuthenticationError> {
        self.run_primary_attempt()
            .await
            .map_err(|err| self.surface(err))
    }

    async fn run_primary_attempt(&self) -> AuthResult<SessionState> {
        if !self.primary.is_available() {
            info!("Host has no SSO channel, using dialog sign-in");
            self.data.lock().strategy = AuthStrategy::Fallback;
            return Ok(self.session_state());
        }

        let attempt = Attempt::begin(
            self,
            AuthMachineInput::PrimaryAttempt,
            AuthMachineInput::PrimaryFailed,
        )?;

        match self.primary.get_access_token().await? {
            PrimaryOutcome::Token(token) => {
                let identity = self.decoder.decode(&token)?;
                info!(user_id = %identity.id, "Signed in through host SSO");
                self.establish(identity, AuthStrategy::Primary);
                attempt.complete(AuthMachineInput::PrimarySucceeded);
            }
            PrimaryOutcome::Aborted => {
                debug!("Primary sign-in aborted by user");
                attempt.abandon();
            }
            PrimaryOutcome::Escalate(code) => {
                info!(code = %code, "Switching to dialog sign-in");
                {
                    let mut data = self.data.lock();
                    data.identity = None;
                    data.strategy = AuthStrategy::Fallback;
                }
                attempt.complete(AuthMachineInput::PrimaryEscalated);
            }
        }

        Ok(self.session_state())
    }

    /// Run the login dialog.
    ///
    /// Dialog failures do not come back as `Err`; they are recorded in
    /// [`last_error`](Self::last_error) for display. `Err` means the attempt
    /// could not start.
    pub async fn sign_in_with_dialog(&self) -> Result<SessionState, AuthenticationError> {
        if self.fallback.is_authenticating() {
            return Err(self.surface(AuthError::DialogAlreadyOpen));
        }
        let attempt = Attempt::begin(
            self,
            AuthMachineInput::DialogAttempt,
            AuthMachineInput::FallbackFailed,
        )
        .map_err(|err| self.surface(err))?;

        let outcome = match self.fallback.authenticate().await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.surface(err)),
        };

        match outcome {
            FallbackOutcome::Authenticated(session) => {
                self.establish(session.identity, AuthStrategy::Fallback);
                attempt.complete(AuthMachineInput::FallbackSucceeded);
            }
            FallbackOutcome::Cancelled => attempt.abandon(),
            FallbackOutcome::Failed(err) => {
                self.surface(err);
                attempt.abandon();
            }
        }

        Ok(self.session_state())
    }

    /// Get an access token for backend calls.
    ///
    /// `Ok(None)` means the user declined consent; there is nothing to show.
    pub async fn get_token(&self) -> Result<Option<String>, AuthenticationError> {
        self.fetch_token().await.map_err(|err| self.surface(err))
    }

    async fn fetch_token(&self) -> AuthResult<Option<String>> {
        match self.strategy() {
            AuthStrategy::Primary => match self.primary.get_access_token().await? {
                PrimaryOutcome::Token(token) => Ok(Some(token)),
                PrimaryOutcome::Aborted => Ok(None),
                PrimaryOutcome::Escalate(code) => {
                    warn!(code = %code, "Host SSO stopped issuing tokens");
                    self.demote();
                    Err(AuthError::SignInRequired)
                }
            },
            AuthStrategy::Fallback => {
                match self
                    .identity_provider
                    .acquire_token_silent(&self.fallback_scopes)
                    .await
                {
                    Ok(token) => Ok(Some(token)),
                    Err(IdpError::ConsentRequired) => {
                        warn!("Silent token acquisition needs consent");
                        self.demote();
                        Err(IdpError::ConsentRequired.into())
                    }
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    /// Forget the identity and cached token.
    pub fn sign_out(&self) {
        self.primary.invalidate();
        {
            let mut data = self.data.lock();
            data.identity = None;
            data.strategy = AuthStrategy::default();
            data.last_error = None;
        }
        self.settle(&AuthMachineInput::SignOut);
        info!("Signed out");
    }

    fn establish(&self, identity: Identity, strategy: AuthStrategy) {
        let mut data = self.data.lock();
        data.identity = Some(identity);
        data.strategy = strategy;
        data.last_error = None;
    }

    /// Drop to unauthenticated under the fallback strategy so the UI
    /// restarts the dialog flow.
    fn demote(&self) {
        {
            let mut data = self.data.lock();
            data.identity = None;
            data.strategy = AuthStrategy::Fallback;
        }
        self.settle(&AuthMachineInput::SessionLost);
    }

    fn surface(&self, err: AuthError) -> AuthenticationError {
        let err = err.into_user_facing();
        warn!(
            code = ?err.code,
            retryable = err.retryable,
            error = %err.message,
            "Authentication error"
        );
        self.data.lock().last_error = Some(err.message.clone());
        err
    }

    /// Transition the FSM and notify callback if state changed.
    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Auth state transition"
            );
            self.notify_state_change(new_state);
        }

        Ok(new_state)
    }

    /// Like `transition`, for inputs that end an attempt: a concurrent
    /// attempt may already have moved the machine on.
    fn settle(&self, input: &AuthMachineInput) {
        if let Err(err) = self.transition(input) {
            debug!(error = %err, "Ignoring stale auth transition");
        }
    }

    fn notify_state_change(&self, state: AuthState) {
        let callback = self.state_callback.lock();
        if let Some(callback) = callback.as_ref() {
            let (user_id, email, strategy) = {
                let data = self.data.lock();
                (
                    data.identity.as_ref().map(|i| i.id.clone()),
                    data.identity.as_ref().and_then(|i| i.email.clone()),
                    data.strategy,
                )
            };

            callback(AuthStateChangedPayload {
                state,
                strategy,
                user_id,
                email,
            });
        }
    }
}

/// Settles an attempt with its failure input unless completed explicitly.
///
/// An attempt started from a signed-in session hands that session back
/// when it fails, so identity and state stay in step.
struct Attempt<'a> {
    session: &'a AuthenticationSession,
    on_abandon: AuthMachineInput,
    resumes_session: bool,
    done: bool,
}

impl<'a> Attempt<'a> {
    fn begin(
        session: &'a AuthenticationSession,
        start: AuthMachineInput,
        on_abandon: AuthMachineInput,
    ) -> AuthResult<Self> {
        let resumes_session = session.is_authenticated() && session.user().is_some();
        session.transition(&start)?;
        Ok(Self {
            session,
            on_abandon,
            resumes_session,
            done: false,
        })
    }

    fn complete(mut self, input: AuthMachineInput) {
        self.done = true;
        self.session.settle(&input);
    }

    fn abandon(mut self) {
        self.done = true;
        self.settle_failure();
    }

    fn settle_failure(&self) {
        if self.resumes_session {
            debug!("Attempt failed, keeping the existing session");
            self.session.settle(&AuthMachineInput::AttemptAbandoned);
        } else {
            self.session.settle(&self.on_abandon);
        }
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.settle_failure();
        }
    }
}
