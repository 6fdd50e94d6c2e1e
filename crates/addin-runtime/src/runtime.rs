//! Add-in runtime.
//!
//! One shared authority for the task pane: it owns the authentication
//! session and the license machine, resolves entitlement once an identity
//! exists, and keeps the trial-expiry watcher running.

use crate::error::RuntimeResult;
use crate::token_source::SessionTokenSource;
use addin_config_and_utils::Config;
use addin_storage::LocalStorage;
use auth_engine::{
    AuthStateChangedPayload, AuthenticationError, AuthenticationSession, DialogHost, DialogSize,
    FallbackAuthenticator, FallbackConfig, Identity, IdentityDecoder, IdentityProvider,
    PrimaryAuthenticator, SessionState, SsoHost,
};
use license_engine::{
    ActivationResponse, Clock, EntitlementRecord, GateDecision, HttpLicensingApi, LicenseResult,
    LicenseStatusMachine, LicensingApi, SystemClock, TrialExpiryWatcher,
};
use observability::DiagnosticsSink;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Host-provided collaborators.
#[derive(Clone)]
pub struct HostBindings {
    pub sso: Arc<dyn SsoHost>,
    pub dialog: Arc<dyn DialogHost>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    /// Parent-local persistent storage.
    pub storage: Arc<dyn LocalStorage>,
}

/// Snapshot of the runtime for the task pane.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSnapshot {
    pub session: SessionState,
    pub user: Option<Identity>,
    pub gate: GateDecision,
    pub trial_days_remaining: u32,
    pub last_error: Option<String>,
}

/// Shared add-in runtime.
pub struct AddinRuntime {
    session: Arc<AuthenticationSession>,
    license: Arc<LicenseStatusMachine>,
    trial_poll_interval: Duration,
    watcher: Mutex<Option<TrialExpiryWatcher>>,
}

impl AddinRuntime {
    /// Create a runtime talking to the configured licensing backend.
    pub fn new(
        config: &Config,
        host: HostBindings,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> RuntimeResult<Self> {
        let api = HttpLicensingApi::new(&config.backend_url)?;
        Self::with_licensing(config, host, Arc::new(api), Arc::new(SystemClock), diagnostics)
    }

    /// Create a runtime with an explicit licensing API and clock.
    pub fn with_licensing(
        config: &Config,
        host: HostBindings,
        api: Arc<dyn LicensingApi>,
        clock: Arc<dyn Clock>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> RuntimeResult<Self> {
        config.validate()?;

        let decoder = IdentityDecoder::new();
        let primary = PrimaryAuthenticator::new(
            host.sso,
            config.token_cache_window(),
            diagnostics.clone(),
        );
        let fallback = FallbackAuthenticator::new(
            host.dialog,
            host.identity_provider.clone(),
            host.storage,
            decoder.clone(),
            diagnostics.clone(),
            FallbackConfig {
                dialog_url: config.login_dialog_url.clone(),
                expected_origin: config.login_origin()?,
                size: DialogSize {
                    height_pct: config.dialog_height_pct,
                    width_pct: config.dialog_width_pct,
                },
            },
        );

        let session = Arc::new(AuthenticationSession::new(
            primary,
            fallback,
            host.identity_provider,
            decoder,
            config.fallback_scopes.clone(),
        ));
        session.set_state_callback(Box::new(|payload: AuthStateChangedPayload| {
            debug!(
                state = ?payload.state,
                strategy = ?payload.strategy,
                user_id = ?payload.user_id,
                "Auth state changed"
            );
        }));

        let license = Arc::new(LicenseStatusMachine::new(
            api,
            Arc::new(SessionTokenSource::new(session.clone())),
            clock,
            diagnostics,
        ));

        Ok(Self {
            session,
            license,
            trial_poll_interval: config.trial_poll_interval(),
            watcher: Mutex::new(None),
        })
    }

    /// Try host SSO, resolve entitlement if that signed the user in, and
    /// start trial polling.
    pub async fn start(&self) -> RuntimeResult<RuntimeSnapshot> {
        let state = self.session.start().await?;
        if state.is_authenticated {
            self.refresh_entitlement().await;
        }
        self.ensure_watcher();
        Ok(self.snapshot())
    }

    /// Run the login dialog, then resolve entitlement on success.
    pub async fn sign_in_with_dialog(&self) -> RuntimeResult<RuntimeSnapshot> {
        let state = self.session.sign_in_with_dialog().await?;
        if state.is_authenticated {
            self.refresh_entitlement().await;
        }
        self.ensure_watcher();
        Ok(self.snapshot())
    }

    /// Token for backend calls made by the task pane.
    pub async fn get_token(&self) -> Result<Option<String>, AuthenticationError> {
        self.session.get_token().await
    }

    /// Explicit retry from the connection-error screen.
    pub async fn retry_identify(&self) -> LicenseResult<EntitlementRecord> {
        self.license.identify().await
    }

    /// Submit a license key and refresh the entitlement when it is accepted.
    pub async fn activate(&self, license_key: &str) -> LicenseResult<ActivationResponse> {
        let response = self.license.activate(license_key).await?;
        if response.activated {
            self.refresh_entitlement().await;
        }
        Ok(response)
    }

    pub fn request_activation(&self) {
        self.license.request_activation();
    }

    pub fn cancel_activation(&self) {
        self.license.cancel_activation();
    }

    pub fn sign_out(&self) {
        self.session.sign_out();
        self.license.reset();
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            session: self.session.session_state(),
            user: self.session.user(),
            gate: self.license.gate(),
            trial_days_remaining: self.license.trial_days_remaining(),
            last_error: self.session.last_error(),
        }
    }

    pub fn subscribe_gate(&self) -> watch::Receiver<GateDecision> {
        self.license.subscribe()
    }

    pub fn session(&self) -> Arc<AuthenticationSession> {
        self.session.clone()
    }

    pub fn license(&self) -> Arc<LicenseStatusMachine> {
        self.license.clone()
    }

    /// Stop trial polling.
    pub async fn shutdown(&self) {
        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            watcher.shutdown().await;
        }
        info!("Add-in runtime stopped");
    }

    /// Identify failures are kept in the license state as a retryable gate.
    async fn refresh_entitlement(&self) {
        if let Err(err) = self.license.identify().await {
            warn!(error = %err, "Entitlement refresh failed");
        }
    }

    fn ensure_watcher(&self) {
        let mut watcher = self.watcher.lock();
        if watcher.as_ref().is_some_and(|w| !w.is_finished()) {
            return;
        }
        *watcher = Some(TrialExpiryWatcher::spawn(
            self.license.clone(),
            self.trial_poll_interval,
        ));
    }
}
