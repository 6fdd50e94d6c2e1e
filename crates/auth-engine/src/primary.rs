//! Token acquisition through the host's single-sign-on channel.

use crate::codes::{SsoDisposition, SsoErrorCode};
use crate::error::{AuthError, AuthResult, PrimaryAuthError};
use crate::host::{SsoError, SsoHost, SsoTokenOptions};
use crate::token_cache::TokenCache;
use observability::{DiagnosticReport, DiagnosticsSink, Severity};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a primary token request that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryOutcome {
    Token(String),
    /// The user declined consent. No token and nothing to show.
    Aborted,
    /// The host cannot provide a token; use the dialog fallback.
    Escalate(SsoErrorCode),
}

/// Acquires access tokens from the host, deduplicated by a [`TokenCache`].
pub struct PrimaryAuthenticator {
    host: Arc<dyn SsoHost>,
    cache: TokenCache<SsoError>,
    options: SsoTokenOptions,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl PrimaryAuthenticator {
    pub fn new(
        host: Arc<dyn SsoHost>,
        cache_window: Duration,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            host,
            cache: TokenCache::new(cache_window),
            options: SsoTokenOptions::default(),
            diagnostics,
        }
    }

    pub fn is_available(&self) -> bool {
        self.host.is_available()
    }

    pub fn cache(&self) -> &TokenCache<SsoError> {
        &self.cache
    }

    /// Drop the cached token (sign-out).
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Get an access token, classifying host failures.
    ///
    /// User-actionable failures come back as `Err(AuthError::Primary)`;
    /// everything the dialog fallback can handle comes back as
    /// `Ok(PrimaryOutcome::Escalate)`.
    pub async fn get_access_token(&self) -> AuthResult<PrimaryOutcome> {
        if !self.host.is_available() {
            info!("Host does not support SSO, escalating to dialog sign-in");
            return Ok(PrimaryOutcome::Escalate(SsoErrorCode::SsoUnsupported));
        }

        let host = Arc::clone(&self.host);
        let diagnostics = Arc::clone(&self.diagnostics);
        let options = self.options;
        let result = self
            .cache
            .acquire(move || async move {
                let result = host.request_token(options).await;
                if let Err(err) = &result {
                    report_failure(diagnostics.as_ref(), err);
                }
                result
            })
            .await;

        match result {
            Ok(token) => {
                debug!("Primary access token acquired");
                Ok(PrimaryOutcome::Token(token))
            }
            Err(err) => classify(err),
        }
    }
}

/// Map a host failure to an outcome. Runs once per caller.
fn classify(err: SsoError) -> AuthResult<PrimaryOutcome> {
    let code = SsoErrorCode::from_code(err.code);

    match code.disposition() {
        SsoDisposition::SilentAbort => {
            debug!(code = %code, "User aborted consent");
            Ok(PrimaryOutcome::Aborted)
        }
        SsoDisposition::ReportToUser => Err(AuthError::Primary(PrimaryAuthError {
            code,
            message: err.message,
        })),
        SsoDisposition::Escalate => Ok(PrimaryOutcome::Escalate(code)),
    }
}

/// Log and report a failed acquisition round. Runs once per round, however
/// many callers share it.
fn report_failure(diagnostics: &dyn DiagnosticsSink, err: &SsoError) {
    let code = SsoErrorCode::from_code(err.code);

    match code.disposition() {
        SsoDisposition::SilentAbort => {
            info!(code = %code, "User aborted consent");
        }
        SsoDisposition::ReportToUser => {
            warn!(code = %code, error = %err.message, "SSO failed with a user-actionable error");
            let error = PrimaryAuthError {
                code,
                message: err.message.clone(),
            };
            diagnostics.report(
                DiagnosticReport::from_error("primary_auth", &error)
                    .with_code(code)
                    .with_context("disposition", "report_to_user"),
            );
        }
        SsoDisposition::Escalate => {
            info!(code = %code, error = %err.message, "SSO unavailable, escalating to dialog sign-in");
            diagnostics.report(
                DiagnosticReport::from_error("primary_auth", err)
                    .with_code(code)
                    .with_severity(Severity::Warning)
                    .with_context("disposition", "escalate"),
            );
        }
    }
}
