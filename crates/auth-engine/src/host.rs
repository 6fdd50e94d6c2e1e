//! Contracts for the host environment.
//!
//! The add-in never talks to the document host, its dialog API or the
//! identity-provider client directly; it goes through these traits so the
//! authenticators can be driven by fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Options passed to the host SSO token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsoTokenOptions {
    pub allow_sign_in_prompt: bool,
    pub allow_consent_prompt: bool,
    pub for_ms_graph_access: bool,
}

impl Default for SsoTokenOptions {
    fn default() -> Self {
        Self {
            allow_sign_in_prompt: true,
            allow_consent_prompt: true,
            for_ms_graph_access: false,
        }
    }
}

/// Failure reported by the host SSO channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("host SSO error {code}: {message}")]
pub struct SsoError {
    pub code: i64,
    pub message: String,
}

impl SsoError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Host single-sign-on channel.
#[async_trait]
pub trait SsoHost: Send + Sync {
    /// Whether the host exposes SSO at all.
    fn is_available(&self) -> bool {
        true
    }

    async fn request_token(&self, options: SsoTokenOptions) -> Result<String, SsoError>;
}

/// Dialog size as a percentage of the host window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogSize {
    pub height_pct: u8,
    pub width_pct: u8,
}

impl Default for DialogSize {
    fn default() -> Self {
        Self {
            height_pct: 60,
            width_pct: 30,
        }
    }
}

/// Event delivered by an open dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEvent {
    /// The dialog posted a message to its opener.
    Message { message: String, origin: String },
    /// The host reported a lifecycle failure (page load, user close, ...).
    LifecycleError { code: i64 },
}

/// Failure reported by the dialog host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dialog host error {code}: {message}")]
pub struct DialogHostError {
    pub code: i64,
    pub message: String,
}

impl DialogHostError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Closes the dialog window behind a [`DialogChannel`].
pub trait DialogCloser: Send {
    fn close(&mut self) -> Result<(), DialogHostError>;
}

/// Handle to an open dialog: its event stream plus a way to close it.
pub struct DialogChannel {
    events: mpsc::UnboundedReceiver<DialogEvent>,
    closer: Box<dyn DialogCloser>,
    closed: bool,
}

impl DialogChannel {
    pub fn new(events: mpsc::UnboundedReceiver<DialogEvent>, closer: Box<dyn DialogCloser>) -> Self {
        Self {
            events,
            closer,
            closed: false,
        }
    }

    /// Next event, or `None` once the host has dropped its sender.
    pub async fn next_event(&mut self) -> Option<DialogEvent> {
        self.events.recv().await
    }

    /// Close the dialog. Calls after the first are no-ops.
    pub fn close(&mut self) -> Result<(), DialogHostError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.events.close();
        self.closer.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for DialogChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogChannel")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Host dialog API.
#[async_trait]
pub trait DialogHost: Send + Sync {
    async fn open_dialog(&self, url: &str, size: DialogSize) -> Result<DialogChannel, DialogHostError>;
}

/// An account known to the identity-provider client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub home_account_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Identity-provider client failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdpError {
    /// Silent acquisition needs user interaction.
    #[error("Interaction required to grant consent")]
    ConsentRequired,

    #[error("No active account")]
    NoActiveAccount,

    #[error("{0}")]
    Other(String),
}

/// Identity-provider client used on the fallback path.
///
/// The client reads its account cache from parent-local storage, so
/// replaying dialog cache entries into storage makes accounts visible here.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn acquire_token_silent(&self, scopes: &[String]) -> Result<String, IdpError>;

    fn list_accounts(&self) -> Vec<Account>;

    fn account_by_id(&self, home_account_id: &str) -> Option<Account>;

    fn set_active_account(&self, account: &Account);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingCloser(Arc<AtomicUsize>);

    impl DialogCloser for CountingCloser {
        fn close(&mut self) -> Result<(), DialogHostError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_channel_delivers_events_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut channel = DialogChannel::new(rx, Box::new(CountingCloser(Arc::default())));

        tx.send(DialogEvent::LifecycleError { code: 12002 }).unwrap();
        tx.send(DialogEvent::Message {
            message: "{}".to_string(),
            origin: "https://a.test".to_string(),
        })
        .unwrap();
        drop(tx);

        assert_eq!(
            channel.next_event().await,
            Some(DialogEvent::LifecycleError { code: 12002 })
        );
        assert!(matches!(
            channel.next_event().await,
            Some(DialogEvent::Message { .. })
        ));
        assert_eq!(channel.next_event().await, None);
    }

    #[test]
    fn test_close_runs_closer_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut channel = DialogChannel::new(rx, Box::new(CountingCloser(closes.clone())));

        channel.close().unwrap();
        channel.close().unwrap();

        assert!(channel.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_options_allow_prompts() {
        let options = SsoTokenOptions::default();
        assert!(options.allow_sign_in_prompt);
        assert!(options.allow_consent_prompt);
        assert!(!options.for_ms_graph_access);
    }

    #[test]
    fn test_account_wire_format() {
        let account: Account = serde_json::from_str(
            r#"{"homeAccountId":"uid.tid","username":"ada@example.com"}"#,
        )
        .unwrap();
        assert_eq!(account.home_account_id, "uid.tid");
        assert!(account.name.is_none());
    }
}
