//! The page loaded inside the sign-in dialog.
//!
//! When it runs inside a dialog it performs the redirect handshake, then
//! posts exactly one [`DialogCompletion`] to the opener. A successful
//! completion carries the identity-provider cache entries from this
//! context's storage so an opener with isolated storage can rehydrate.

use crate::completion::DialogCompletion;
use crate::oauth::OAuthCallbackServer;
use crate::{AuthError, AuthResult};
use addin_storage::{LocalStorage, StorageKeys};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The browsing context the login route runs in.
pub trait DialogContext: Send + Sync {
    /// Whether this context was opened as a host dialog.
    fn is_in_dialog(&self) -> bool;

    /// Navigate this context to `url`.
    fn navigate(&self, url: &str) -> Result<(), String>;

    /// Post a message to the dialog's opener.
    fn message_parent(&self, message: &str) -> Result<(), String>;
}

/// Tokens returned by a finished handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeTokens {
    pub access_token: String,
    pub account_id: String,
}

/// Redirect-based sign-in handshake.
#[async_trait]
pub trait RedirectHandshake: Send + Sync {
    async fn run(&self, context: &dyn DialogContext) -> AuthResult<HandshakeTokens>;
}

/// Handshake through a sign-in broker redirecting to a loopback listener.
#[derive(Debug, Clone)]
pub struct CallbackServerHandshake {
    server: OAuthCallbackServer,
    broker_url: String,
}

impl CallbackServerHandshake {
    pub fn new(server: OAuthCallbackServer, broker_url: impl Into<String>) -> Self {
        Self {
            server,
            broker_url: broker_url.into(),
        }
    }
}

#[async_trait]
impl RedirectHandshake for CallbackServerHandshake {
    async fn run(&self, context: &dyn DialogContext) -> AuthResult<HandshakeTokens> {
        let state = Uuid::new_v4().to_string();
        let listener = self.server.start(&state).await?;
        let auth_url = listener.auth_url(&self.broker_url, &state)?;

        debug!(url = %auth_url, "Navigating dialog to sign-in broker");
        context.navigate(&auth_url).map_err(AuthError::OAuth)?;

        let result = listener.wait().await?;
        match (result.access_token, result.account_id) {
            (Some(access_token), Some(account_id)) if result.success => Ok(HandshakeTokens {
                access_token,
                account_id,
            }),
            _ => Err(AuthError::OAuth(
                result
                    .error
                    .unwrap_or_else(|| "Sign-in did not complete".to_string()),
            )),
        }
    }
}

/// What the login route did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginRouteOutcome {
    /// Opened outside a dialog; nothing was posted.
    NotInDialog,
    /// The completion message was posted to the opener.
    Posted { success: bool },
}

/// Login route controller.
pub struct LoginRoute {
    context: Arc<dyn DialogContext>,
    handshake: Arc<dyn RedirectHandshake>,
    storage: Arc<dyn LocalStorage>,
}

impl LoginRoute {
    pub fn new(
        context: Arc<dyn DialogContext>,
        handshake: Arc<dyn RedirectHandshake>,
        storage: Arc<dyn LocalStorage>,
    ) -> Self {
        Self {
            context,
            handshake,
            storage,
        }
    }

    pub async fn run(&self) -> AuthResult<LoginRouteOutcome> {
        if !self.context.is_in_dialog() {
            info!("Login route opened outside a dialog");
            return Ok(LoginRouteOutcome::NotInDialog);
        }

        let completion = match self.handshake.run(self.context.as_ref()).await {
            Ok(tokens) => {
                let cache = self.cache_snapshot()?;
                info!(entries = cache.len(), "Sign-in handshake finished");
                DialogCompletion::Success {
                    access_token: tokens.access_token,
                    account_id: tokens.account_id,
                    cache,
                }
            }
            Err(err) => {
                warn!(error = %err, "Sign-in handshake failed");
                DialogCompletion::error(err.to_string())
            }
        };

        let success = completion.is_success();
        let message = completion.to_message()?;
        self.context
            .message_parent(&message)
            .map_err(AuthError::OAuth)?;

        Ok(LoginRouteOutcome::Posted { success })
    }

    fn cache_snapshot(&self) -> AuthResult<BTreeMap<String, String>> {
        Ok(self
            .storage
            .entries_with_prefix(StorageKeys::IDENTITY_CACHE_PREFIX)?
            .into_iter()
            .collect())
    }
}
