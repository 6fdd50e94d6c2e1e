//! Authentication state machines using rust-fsm.
//!
//! Two machines live here: the session machine tracked by
//! [`AuthenticationSession`](crate::AuthenticationSession) and the dialog
//! machine tracked by [`FallbackAuthenticator`](crate::FallbackAuthenticator).
//!
//! ## Session
//!
//! ```text
//! ┌──────────────────┐  DialogAttempt   ┌────────────────────────┐
//! │ NotAuthenticated │ ───────────────► │ AuthenticatingFallback │
//! └───┬──────────────┘                  └───────────┬────────────┘
//!     │ PrimaryAttempt        FallbackSucceeded /   │
//!     ▼                       FallbackFailed        │
//! ┌───────────────────────┐                         │
//! │ AuthenticatingPrimary │                         │
//! └───┬───────────────────┘                         │
//!     │ PrimarySucceeded                            ▼
//!     │ (PrimaryEscalated / PrimaryFailed ──► NotAuthenticated)
//!     ▼
//! ┌───────────────┐  SessionLost / SignOut
//! │ Authenticated │ ──────────────────────► NotAuthenticated
//! └───────────────┘
//! ```
//!
//! A re-authentication started from `Authenticated` settles with
//! `AttemptAbandoned` when it fails, returning to `Authenticated`.
//!
//! ## Dialog
//!
//! ```text
//! Idle ──Open──► DialogOpen ──Succeeded──► Authenticated
//!                    │ ──────Cancelled──► FailedSilently
//!                    └───────Failed─────► FailedVisibly
//! (every terminal state accepts Open again)
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(NotAuthenticated)

    NotAuthenticated => {
        PrimaryAttempt => AuthenticatingPrimary,
        DialogAttempt => AuthenticatingFallback,
        SignOut => NotAuthenticated
    },
    AuthenticatingPrimary => {
        // Concurrent callers share the token cache round
        PrimaryAttempt => AuthenticatingPrimary,
        PrimarySucceeded => Authenticated,
        // Host cannot issue tokens; the dialog takes over
        PrimaryEscalated => NotAuthenticated,
        PrimaryFailed => NotAuthenticated,
        // A failed re-authentication keeps the existing session
        AttemptAbandoned => Authenticated
    },
    AuthenticatingFallback => {
        FallbackSucceeded => Authenticated,
        FallbackFailed => NotAuthenticated,
        AttemptAbandoned => Authenticated
    },
    Authenticated => {
        PrimaryAttempt => AuthenticatingPrimary,
        DialogAttempt => AuthenticatingFallback,
        // Silent acquisition needs interaction again
        SessionLost => NotAuthenticated,
        SignOut => NotAuthenticated
    }
}

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub dialog_machine(Idle)

    Idle => {
        Open => DialogOpen
    },
    DialogOpen => {
        Succeeded => Authenticated,
        Cancelled => FailedSilently,
        Failed => FailedVisibly
    },
    Authenticated => {
        Open => DialogOpen
    },
    FailedSilently => {
        Open => DialogOpen
    },
    FailedVisibly => {
        Open => DialogOpen
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

pub use dialog_machine::Input as DialogMachineInput;
pub use dialog_machine::State as DialogMachineState;
pub use dialog_machine::StateMachine as DialogMachine;

/// Session authentication state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NotAuthenticated,
    /// Waiting on the host SSO channel.
    AuthenticatingPrimary,
    /// Waiting on the login dialog.
    AuthenticatingFallback,
    Authenticated,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// Returns true if the state is a transient/in-progress state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::AuthenticatingPrimary | AuthState::AuthenticatingFallback
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::NotAuthenticated => AuthState::NotAuthenticated,
            AuthMachineState::AuthenticatingPrimary => AuthState::AuthenticatingPrimary,
            AuthMachineState::AuthenticatingFallback => AuthState::AuthenticatingFallback,
            AuthMachineState::Authenticated => AuthState::Authenticated,
        }
    }
}

/// Dialog lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    Idle,
    DialogOpen,
    Authenticated,
    FailedSilently,
    FailedVisibly,
}

impl From<&DialogMachineState> for DialogState {
    fn from(state: &DialogMachineState) -> Self {
        match state {
            DialogMachineState::Idle => DialogState::Idle,
            DialogMachineState::DialogOpen => DialogState::DialogOpen,
            DialogMachineState::Authenticated => DialogState::Authenticated,
            DialogMachineState::FailedSilently => DialogState::FailedSilently,
            DialogMachineState::FailedVisibly => DialogState::FailedVisibly,
        }
    }
}

/// Which channel produced the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Host single sign-on.
    #[default]
    Primary,
    /// Login dialog plus identity-provider silent acquisition.
    Fallback,
}

/// Snapshot of the session exposed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub strategy: AuthStrategy,
}

/// Payload for auth state change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    pub state: AuthState,
    pub strategy: AuthStrategy,
    /// User ID if authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// User email if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
