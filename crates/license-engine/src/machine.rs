//! License status machine.
//!
//! Holds the caller's [`EntitlementRecord`], refreshes it through
//! [`LicensingApi::identify`], submits activations, and publishes the
//! derived [`GateDecision`] on a watch channel.
//!
//! Status transitions:
//!
//! ```text
//! Unknown ──identify ok──► Active | Trial | Blocked
//!    │                          ▲        │
//!    └──identify err──► ConnectionError ─┘ (identify ok)
//!
//! Blocked is held for the rest of the session; identify() no longer calls
//! the backend.
//! ```

use crate::client::{ActivationRequest, ActivationResponse, LicensingApi};
use crate::clock::Clock;
use crate::entitlement::{
    resolve_gate, trial_days_remaining, EntitlementRecord, EntitlementStatus, GateDecision,
};
use crate::error::{LicenseError, LicenseResult};
use async_trait::async_trait;
use observability::{DiagnosticReport, DiagnosticsSink, Severity};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Supplies the signed-in identity's bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Id of the current identity, if anyone is signed in.
    fn identity_id(&self) -> Option<String>;

    async fn access_token(&self) -> LicenseResult<String>;
}

#[derive(Debug, Default)]
struct LicenseState {
    record: EntitlementRecord,
    activation_requested: bool,
}

/// Entitlement holder and activation driver.
pub struct LicenseStatusMachine {
    api: Arc<dyn LicensingApi>,
    tokens: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    state: RwLock<LicenseState>,
    gate_tx: watch::Sender<GateDecision>,
}

impl LicenseStatusMachine {
    pub fn new(
        api: Arc<dyn LicensingApi>,
        tokens: Arc<dyn TokenSource>,
        clock: Arc<dyn Clock>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let (gate_tx, _) = watch::channel(GateDecision::Loading);
        Self {
            api,
            tokens,
            clock,
            diagnostics,
            state: RwLock::new(LicenseState::default()),
            gate_tx,
        }
    }

    /// Fetch the caller's entitlement and replace the held record.
    ///
    /// On failure the status becomes `ConnectionError` and the call can be
    /// retried. A blocked record is returned as-is without a request.
    pub async fn identify(&self) -> LicenseResult<EntitlementRecord> {
        {
            let state = self.state.read();
            if state.record.status == EntitlementStatus::Blocked {
                debug!("Entitlement blocked, skipping identify");
                return Ok(state.record.clone());
            }
        }

        let Some(identity_id) = self.tokens.identity_id() else {
            return Err(LicenseError::NotSignedIn);
        };

        match self.fetch_record().await {
            Ok(record) => {
                info!(
                    identity_id = %identity_id,
                    status = ?record.status,
                    has_access = record.has_access,
                    "Entitlement resolved"
                );
                self.state.write().record = record.clone();
                self.publish_gate();
                Ok(record)
            }
            Err(err) => {
                warn!(identity_id = %identity_id, error = %err, "Identify failed");
                self.diagnostics.report(
                    DiagnosticReport::from_error("license_identify", &err)
                        .with_code("connection_error")
                        .with_severity(if err.is_transient() {
                            Severity::Warning
                        } else {
                            Severity::Error
                        }),
                );
                self.state.write().record.status = EntitlementStatus::ConnectionError;
                self.publish_gate();
                Err(err)
            }
        }
    }

    async fn fetch_record(&self) -> LicenseResult<EntitlementRecord> {
        let token = self.tokens.access_token().await?;
        self.api.identify(&token).await
    }

    /// Submit a license key.
    ///
    /// Blank keys are rejected before any request. Callers re-run
    /// [`identify`](Self::identify) after a successful activation.
    pub async fn activate(&self, license_key: &str) -> LicenseResult<ActivationResponse> {
        let license_key = license_key.trim();
        if license_key.is_empty() {
            return Err(LicenseError::EmptyLicenseKey);
        }
        if self.tokens.identity_id().is_none() {
            return Err(LicenseError::NotSignedIn);
        }

        let request = ActivationRequest {
            license_key: license_key.to_string(),
        };
        let result = match self.tokens.access_token().await {
            Ok(token) => self.api.activate(&token, &request).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(response) => {
                info!(activated = response.activated, "License activation finished");
                if response.activated {
                    self.state.write().activation_requested = false;
                    self.publish_gate();
                }
                Ok(response)
            }
            Err(err) if err.is_user_input() => {
                info!("License key rejected by backend");
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "License activation failed");
                self.diagnostics
                    .report(DiagnosticReport::from_error("license_activate", &err));
                Err(err)
            }
        }
    }

    /// Show the activation prompt even while a trial still grants access.
    pub fn request_activation(&self) {
        self.state.write().activation_requested = true;
        self.publish_gate();
    }

    pub fn cancel_activation(&self) {
        self.state.write().activation_requested = false;
        self.publish_gate();
    }

    /// Forget the record (sign-out). Blocked does not survive this.
    pub fn reset(&self) {
        *self.state.write() = LicenseState::default();
        self.publish_gate();
        debug!("Entitlement reset");
    }

    pub fn activation_requested(&self) -> bool {
        self.state.read().activation_requested
    }

    pub fn record(&self) -> EntitlementRecord {
        self.state.read().record.clone()
    }

    pub fn status(&self) -> EntitlementStatus {
        self.state.read().record.status
    }

    /// Gate at the current wall-clock time.
    pub fn gate(&self) -> GateDecision {
        let state = self.state.read();
        resolve_gate(&state.record, self.clock.now(), state.activation_requested)
    }

    pub fn trial_days_remaining(&self) -> u32 {
        trial_days_remaining(&self.state.read().record, self.clock.now())
    }

    /// Watch gate changes. The receiver starts at the current gate.
    pub fn subscribe(&self) -> watch::Receiver<GateDecision> {
        self.gate_tx.subscribe()
    }

    /// Re-evaluate the gate against the clock and publish it if it changed.
    ///
    /// Returns the current gate.
    pub fn publish_gate(&self) -> GateDecision {
        let gate = self.gate();
        self.gate_tx.send_if_modified(|current| {
            if *current == gate {
                return false;
            }
            debug!(from = ?*current, to = ?gate, "Gate changed");
            *current = gate;
            true
        });
        gate
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::clock::MockClock;
    use crate::error::{ACTIVATION_RETRY_MESSAGE, INVALID_LICENSE_KEY_MESSAGE};
    use chrono::{Duration, TimeZone, Utc};
    use observability::RecordingDiagnostics;

    struct Harness {
        api: Arc<ScriptedLicensingApi>,
        clock: Arc<MockClock>,
        diagnostics: RecordingDiagnostics,
        machine: LicenseStatusMachine,
    }

    fn harness_with(tokens: StaticTokenSource) -> Harness {
        let api = Arc::new(ScriptedLicensingApi::new());
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let diagnostics = RecordingDiagnostics::new();
        let machine = LicenseStatusMachine::new(
            api.clone(),
            Arc::new(tokens),
            clock.clone(),
            Arc::new(diagnostics.clone()),
        );
        Harness {
            api,
            clock,
            diagnostics,
            machine,
        }
    }

    fn harness() -> Harness {
        harness_with(StaticTokenSource::signed_in())
    }

    #[tokio::test]
    async fn test_starts_unknown_and_loading() {
        let h = harness();
        assert_eq!(h.machine.status(), EntitlementStatus::Unknown);
        assert_eq!(h.machine.gate(), GateDecision::Loading);
        assert_eq!(*h.machine.subscribe().borrow(), GateDecision::Loading);
    }

    #[tokio::test]
    async fn test_identify_replaces_record() {
        let h = harness();
        h.api.push_identify(Ok(record(EntitlementStatus::Active)));

        let record = h.machine.identify().await.unwrap();

        assert_eq!(record.status, EntitlementStatus::Active);
        assert_eq!(h.machine.record(), record);
        assert_eq!(h.machine.gate(), GateDecision::FullAccess);
        assert_eq!(*h.machine.subscribe().borrow(), GateDecision::FullAccess);
    }

    #[tokio::test]
    async fn test_identify_requires_identity() {
        let h = harness_with(StaticTokenSource::signed_out());

        assert!(matches!(
            h.machine.identify().await,
            Err(LicenseError::NotSignedIn)
        ));
        assert_eq!(h.api.identify_calls(), 0);
        assert_eq!(h.machine.status(), EntitlementStatus::Unknown);
    }

    #[tokio::test]
    async fn test_identify_failure_sets_connection_error_then_recovers() {
        let h = harness();
        h.api
            .push_identify(Err(api_error(503, "unavailable")))
            .push_identify(Ok(record(EntitlementStatus::Active)));

        assert!(h.machine.identify().await.is_err());
        assert_eq!(h.machine.status(), EntitlementStatus::ConnectionError);
        assert_eq!(h.machine.gate(), GateDecision::RetryableError);
        assert_eq!(h.diagnostics.kinds(), vec!["license_identify".to_string()]);

        let record = h.machine.identify().await.unwrap();
        assert_eq!(record.status, EntitlementStatus::Active);
        assert_eq!(h.machine.gate(), GateDecision::FullAccess);
    }

    #[tokio::test]
    async fn test_blocked_is_held_without_network() {
        let h = harness();
        h.api.push_identify(Ok(record(EntitlementStatus::Blocked)));

        h.machine.identify().await.unwrap();
        let again = h.machine.identify().await.unwrap();

        assert_eq!(again.status, EntitlementStatus::Blocked);
        assert_eq!(h.api.identify_calls(), 1);
        assert_eq!(h.machine.gate(), GateDecision::Blocked);
    }

    #[tokio::test]
    async fn test_reset_returns_to_loading() {
        let h = harness();
        h.api
            .push_identify(Ok(record(EntitlementStatus::Blocked)))
            .push_identify(Ok(record(EntitlementStatus::Active)));
        h.machine.identify().await.unwrap();
        h.machine.request_activation();

        h.machine.reset();

        assert_eq!(h.machine.status(), EntitlementStatus::Unknown);
        assert!(!h.machine.activation_requested());
        assert_eq!(*h.machine.subscribe().borrow(), GateDecision::Loading);

        // A new session identifies again.
        assert_eq!(
            h.machine.identify().await.unwrap().status,
            EntitlementStatus::Active
        );
        assert_eq!(h.api.identify_calls(), 2);
    }

    #[tokio::test]
    async fn test_activate_rejects_blank_keys_without_network() {
        let h = harness();
        for key in ["", "   ", "\t\n"] {
            let err = h.machine.activate(key).await.unwrap_err();
            assert!(matches!(err, LicenseError::EmptyLicenseKey));
        }
        assert_eq!(h.api.activate_calls(), 0);
        assert!(h.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_activate_trims_key() {
        let h = harness();
        let response = h.machine.activate("  ABC-123 \n").await.unwrap();

        assert!(response.activated);
        assert_eq!(h.api.keys(), vec!["ABC-123".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_license_not_found_is_not_reported() {
        let h = harness();
        h.api.push_activate(Err(api_error(404, "License not found")));

        let err = h.machine.activate("bogus").await.unwrap_err();

        assert_eq!(err.user_message(), INVALID_LICENSE_KEY_MESSAGE);
        assert!(h.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_activate_other_failure_is_reported() {
        let h = harness();
        h.api.push_activate(Err(api_error(500, "database down")));

        let err = h.machine.activate("key").await.unwrap_err();

        assert_eq!(err.user_message(), ACTIVATION_RETRY_MESSAGE);
        assert_eq!(h.diagnostics.kinds(), vec!["license_activate".to_string()]);
    }

    #[tokio::test]
    async fn test_activation_request_toggles_trial_gate() {
        let h = harness();
        let mut trial = record(EntitlementStatus::Trial);
        trial.trial_end_time = Some(h.clock.now() + Duration::days(3));
        h.api.push_identify(Ok(trial));
        h.machine.identify().await.unwrap();
        assert_eq!(h.machine.gate(), GateDecision::FullAccess);
        assert_eq!(h.machine.trial_days_remaining(), 3);

        h.machine.request_activation();
        assert!(h.machine.activation_requested());
        assert_eq!(h.machine.gate(), GateDecision::ActivationPrompt);

        h.machine.cancel_activation();
        assert_eq!(h.machine.gate(), GateDecision::FullAccess);
    }

    #[tokio::test]
    async fn test_successful_activation_clears_request() {
        let h = harness();
        h.machine.request_activation();
        h.machine.activate("ABC").await.unwrap();
        assert!(!h.machine.activation_requested());
    }

    #[tokio::test]
    async fn test_publish_gate_notifies_only_on_change() {
        let h = harness();
        let mut trial = record(EntitlementStatus::Trial);
        trial.trial_end_time = Some(h.clock.now() + Duration::milliseconds(1000));
        h.api.push_identify(Ok(trial));
        h.machine.identify().await.unwrap();

        let mut rx = h.machine.subscribe();
        rx.borrow_and_update();

        assert_eq!(h.machine.publish_gate(), GateDecision::FullAccess);
        assert!(!rx.has_changed().unwrap());

        h.clock.advance(Duration::milliseconds(1500));
        assert_eq!(h.machine.publish_gate(), GateDecision::ActivationPrompt);
        assert!(rx.has_changed().unwrap());
    }
}
