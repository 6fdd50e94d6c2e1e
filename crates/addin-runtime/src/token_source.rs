//! Bridges the authentication session into the license machine.

use async_trait::async_trait;
use auth_engine::AuthenticationSession;
use license_engine::{LicenseError, LicenseResult, TokenSource};
use std::sync::Arc;

/// [`TokenSource`] backed by an [`AuthenticationSession`].
#[derive(Clone)]
pub struct SessionTokenSource {
    session: Arc<AuthenticationSession>,
}

impl SessionTokenSource {
    pub fn new(session: Arc<AuthenticationSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl TokenSource for SessionTokenSource {
    fn identity_id(&self) -> Option<String> {
        self.session.user().map(|identity| identity.id)
    }

    async fn access_token(&self) -> LicenseResult<String> {
        match self.session.get_token().await {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(LicenseError::Token("sign-in was cancelled".to_string())),
            Err(err) => Err(LicenseError::Token(err.message)),
        }
    }
}
