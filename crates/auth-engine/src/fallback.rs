//! Dialog-based sign-in.
//!
//! Opens the login route in a host dialog and waits for exactly one
//! completion: either a message posted by the dialog or a lifecycle error
//! reported by the host. The dialog is closed and the machine leaves
//! `DialogOpen` exactly once, even if the waiting future is dropped.

use crate::auth_fsm::{DialogMachine, DialogMachineInput, DialogMachineState, DialogState};
use crate::codes::DialogErrorCode;
use crate::completion::{error_text, DialogCompletion};
use crate::error::{AuthError, AuthResult, FallbackAuthError};
use crate::host::{Account, DialogChannel, DialogEvent, DialogHost, DialogSize, IdentityProvider};
use crate::identity::{Identity, IdentityDecoder};
use addin_storage::LocalStorage;
use observability::{DiagnosticReport, DiagnosticsSink, Severity};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Successful dialog sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackSession {
    pub identity: Identity,
    pub access_token: String,
    /// Account selected as active, when the identity provider knows it.
    pub account: Option<Account>,
}

/// How a dialog attempt ended.
#[derive(Debug)]
pub enum FallbackOutcome {
    Authenticated(FallbackSession),
    /// The user closed the dialog; nothing to show.
    Cancelled,
    /// A failure to show to the user.
    Failed(AuthError),
}

/// Settings for [`FallbackAuthenticator`].
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Login route opened in the dialog.
    pub dialog_url: String,
    /// Origin completion messages must come from.
    pub expected_origin: String,
    pub size: DialogSize,
}

/// Runs the login dialog and turns its completion into a session.
pub struct FallbackAuthenticator {
    dialog_host: Arc<dyn DialogHost>,
    identity_provider: Arc<dyn IdentityProvider>,
    storage: Arc<dyn LocalStorage>,
    decoder: IdentityDecoder,
    diagnostics: Arc<dyn DiagnosticsSink>,
    config: FallbackConfig,
    fsm: Mutex<DialogMachine>,
}

impl FallbackAuthenticator {
    pub fn new(
        dialog_host: Arc<dyn DialogHost>,
        identity_provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn LocalStorage>,
        decoder: IdentityDecoder,
        diagnostics: Arc<dyn DiagnosticsSink>,
        config: FallbackConfig,
    ) -> Self {
        Self {
            dialog_host,
            identity_provider,
            storage,
            decoder,
            diagnostics,
            config,
            fsm: Mutex::new(DialogMachine::new()),
        }
    }

    pub fn state(&self) -> DialogState {
        DialogState::from(self.fsm.lock().state())
    }

    pub fn is_authenticating(&self) -> bool {
        *self.fsm.lock().state() == DialogMachineState::DialogOpen
    }

    /// Open the login dialog and wait for it to finish.
    ///
    /// Only a second call while a dialog is already open is an `Err`; every
    /// outcome of the dialog itself is reported through [`FallbackOutcome`].
    pub async fn authenticate(&self) -> AuthResult<FallbackOutcome> {
        self.fsm
            .lock()
            .consume(&DialogMachineInput::Open)
            .map_err(|_| AuthError::DialogAlreadyOpen)?;
        let mut attempt = DialogAttempt::new(&self.fsm);

        info!(url = %self.config.dialog_url, "Opening sign-in dialog");
        let channel = match self
            .dialog_host
            .open_dialog(&self.config.dialog_url, self.config.size)
            .await
        {
            Ok(channel) => channel,
            Err(err) => {
                let outcome = self.lifecycle_failure(err.code);
                attempt.finish(&outcome);
                return Ok(outcome);
            }
        };
        attempt.attach(channel);

        let outcome = loop {
            match attempt.next_event().await {
                Some(DialogEvent::Message { message, origin }) => {
                    if origin != self.config.expected_origin {
                        warn!(
                            origin = %origin,
                            expected = %self.config.expected_origin,
                            "Ignoring dialog message from unexpected origin"
                        );
                        continue;
                    }
                    attempt.close_dialog();
                    break self.handle_message(&message);
                }
                Some(DialogEvent::LifecycleError { code }) => {
                    attempt.close_dialog();
                    break self.lifecycle_failure(code);
                }
                None => {
                    info!("Dialog went away without a completion message");
                    break FallbackOutcome::Cancelled;
                }
            }
        };

        attempt.finish(&outcome);
        Ok(outcome)
    }

    fn handle_message(&self, message: &str) -> FallbackOutcome {
        let completion = match DialogCompletion::parse(message) {
            Ok(completion) => completion,
            Err(err) => {
                warn!(error = %err, "Dialog posted an unreadable message");
                let error = AuthError::InvalidDialogMessage(err.to_string());
                self.diagnostics
                    .report(DiagnosticReport::from_error("fallback_auth", &error));
                return FallbackOutcome::Failed(error);
            }
        };

        match completion {
            DialogCompletion::Success {
                access_token,
                account_id,
                cache,
            } => match self.complete_sign_in(access_token, &account_id, cache) {
                Ok(session) => {
                    info!(user_id = %session.identity.id, "Dialog sign-in succeeded");
                    FallbackOutcome::Authenticated(session)
                }
                Err(error) => {
                    warn!(error = %error, "Dialog sign-in could not be completed");
                    self.diagnostics
                        .report(DiagnosticReport::from_error("fallback_auth", &error));
                    FallbackOutcome::Failed(error)
                }
            },
            DialogCompletion::Error { error } => {
                let text = error_text(&error);
                warn!(error = %text, "Dialog reported a sign-in error");
                self.diagnostics.report(
                    DiagnosticReport::new("fallback_auth", text.clone())
                        .with_code("dialog_error"),
                );
                FallbackOutcome::Failed(AuthError::DialogReported(text))
            }
        }
    }

    fn complete_sign_in(
        &self,
        access_token: String,
        account_id: &str,
        cache: BTreeMap<String, String>,
    ) -> AuthResult<FallbackSession> {
        // The dialog may run with its own storage; hand its cache to ours
        // before asking the identity provider about accounts.
        if self.identity_provider.list_accounts().is_empty() {
            for (key, value) in &cache {
                self.storage.set(key, value)?;
            }
            debug!(entries = cache.len(), "Replayed dialog cache into local storage");
        }

        let account = self.identity_provider.account_by_id(account_id);
        match &account {
            Some(account) => self.identity_provider.set_active_account(account),
            None => warn!(account_id = %account_id, "Signed-in account not known to identity provider"),
        }

        let identity = self.decoder.decode(&access_token)?;
        Ok(FallbackSession {
            identity,
            access_token,
            account,
        })
    }

    fn lifecycle_failure(&self, code: i64) -> FallbackOutcome {
        let code = DialogErrorCode::from_code(code);
        let error = FallbackAuthError::new(code);

        if code.is_user_initiated() {
            info!(code = %code, "Sign-in dialog closed by user");
            self.diagnostics.report(
                DiagnosticReport::from_error("fallback_auth", &error)
                    .with_code(code)
                    .with_severity(Severity::Info),
            );
            return FallbackOutcome::Cancelled;
        }

        warn!(code = %code, "Sign-in dialog failed");
        self.diagnostics
            .report(DiagnosticReport::from_error("fallback_auth", &error).with_code(code));
        FallbackOutcome::Failed(AuthError::Fallback(error))
    }
}

/// One open dialog. Dropping it closes the dialog and leaves `DialogOpen`.
struct DialogAttempt<'a> {
    fsm: &'a Mutex<DialogMachine>,
    channel: Option<DialogChannel>,
    finished: bool,
}

impl<'a> DialogAttempt<'a> {
    fn new(fsm: &'a Mutex<DialogMachine>) -> Self {
        Self {
            fsm,
            channel: None,
            finished: false,
        }
    }

    fn attach(&mut self, channel: DialogChannel) {
        self.channel = Some(channel);
    }

    async fn next_event(&mut self) -> Option<DialogEvent> {
        match self.channel.as_mut() {
            Some(channel) => channel.next_event().await,
            None => None,
        }
    }

    fn close_dialog(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            if let Err(err) = channel.close() {
                warn!(error = %err, "Failed to close sign-in dialog");
            }
        }
    }

    fn finish(&mut self, outcome: &FallbackOutcome) {
        let input = match outcome {
            FallbackOutcome::Authenticated(_) => DialogMachineInput::Succeeded,
            FallbackOutcome::Cancelled => DialogMachineInput::Cancelled,
            FallbackOutcome::Failed(_) => DialogMachineInput::Failed,
        };
        self.settle(&input);
    }

    fn settle(&mut self, input: &DialogMachineInput) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.close_dialog();

        let mut fsm = self.fsm.lock();
        if fsm.consume(input).is_err() {
            debug!(state = ?fsm.state(), input = ?input, "Dialog already settled");
        }
    }
}

impl Drop for DialogAttempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Sign-in dialog abandoned");
            self.settle(&DialogMachineInput::Cancelled);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{ScriptedDialogHost, StorageBackedIdp, ORIGIN};
    use super::*;
    use crate::host::DialogHostError;
    use crate::identity::test_token;
    use addin_storage::MemoryStorage;
    use observability::RecordingDiagnostics;
    use serde_json::json;

    struct Harness {
        auth: FallbackAuthenticator,
        host: Arc<ScriptedDialogHost>,
        idp: Arc<StorageBackedIdp>,
        storage: Arc<MemoryStorage>,
        diagnostics: RecordingDiagnostics,
    }

    fn harness(host: ScriptedDialogHost) -> Harness {
        let host = Arc::new(host);
        let storage = Arc::new(MemoryStorage::new());
        let idp = Arc::new(StorageBackedIdp::new(storage.clone()));
        let diagnostics = RecordingDiagnostics::new();
        let auth = FallbackAuthenticator::new(
            host.clone(),
            idp.clone(),
            storage.clone(),
            IdentityDecoder::new(),
            Arc::new(diagnostics.clone()),
            FallbackConfig {
                dialog_url: format!("{ORIGIN}/login"),
                expected_origin: ORIGIN.to_string(),
                size: DialogSize::default(),
            },
        );
        Harness {
            auth,
            host,
            idp,
            storage,
            diagnostics,
        }
    }

    fn message(body: serde_json::Value) -> DialogEvent {
        DialogEvent::Message {
            message: body.to_string(),
            origin: ORIGIN.to_string(),
        }
    }

    fn success(cache: serde_json::Value) -> DialogEvent {
        message(json!({
            "status": "success",
            "accessToken": test_token(json!({ "oid": "user-1", "preferred_username": "ada@example.com" })),
            "accountId": "user-1.tenant",
            "cache": cache,
        }))
    }

    #[tokio::test]
    async fn test_success_with_empty_cache() {
        let h = harness(ScriptedDialogHost::with_events(vec![success(json!({}))]));

        let outcome = h.auth.authenticate().await.unwrap();
        match outcome {
            FallbackOutcome::Authenticated(session) => {
                assert_eq!(session.identity.id, "user-1");
                assert_eq!(session.identity.email.as_deref(), Some("ada@example.com"));
                assert!(session.account.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(h.auth.state(), DialogState::Authenticated);
        assert!(!h.auth.is_authenticating());
        assert_eq!(h.host.closes(), 1);
    }

    #[tokio::test]
    async fn test_cache_is_replayed_before_account_lookup() {
        let account = json!({ "homeAccountId": "user-1.tenant", "username": "ada@example.com" });
        let h = harness(ScriptedDialogHost::with_events(vec![success(json!({
            "idp.account.user-1.tenant": account.to_string(),
            "idp.token.access": "opaque",
        }))]));

        let outcome = h.auth.authenticate().await.unwrap();
        let session = match outcome {
            FallbackOutcome::Authenticated(session) => session,
            other => panic!("unexpected outcome: {other:?}"),
        };

        assert_eq!(h.storage.len(), 2);
        assert_eq!(*h.idp.storage_len_at_lookup.lock(), vec![2]);
        assert_eq!(
            session.account.as_ref().map(|a| a.home_account_id.as_str()),
            Some("user-1.tenant")
        );
        assert_eq!(h.idp.active.lock().as_ref(), session.account.as_ref());
    }

    #[tokio::test]
    async fn test_cache_not_replayed_when_accounts_exist() {
        let h = harness(ScriptedDialogHost::with_events(vec![success(json!({
            "idp.token.access": "from-dialog",
        }))]));
        h.storage
            .set(
                "idp.account.existing",
                &json!({ "homeAccountId": "existing", "username": "x" }).to_string(),
            )
            .unwrap();

        h.auth.authenticate().await.unwrap();
        assert!(h.storage.get("idp.token.access").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_closed_dialog_is_silent_but_reported() {
        let h = harness(ScriptedDialogHost::with_events(vec![
            DialogEvent::LifecycleError { code: 12006 },
        ]));

        let outcome = h.auth.authenticate().await.unwrap();
        assert!(matches!(outcome, FallbackOutcome::Cancelled));
        assert!(!h.auth.is_authenticating());
        assert_eq!(h.auth.state(), DialogState::FailedSilently);

        let reports = h.diagnostics.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].code.as_deref(), Some("12006"));
        assert_eq!(reports[0].severity, Severity::Info);
    }

    #[tokio::test]
    async fn test_other_lifecycle_errors_are_visible() {
        let h = harness(ScriptedDialogHost::with_events(vec![
            DialogEvent::LifecycleError { code: 12002 },
        ]));

        let outcome = h.auth.authenticate().await.unwrap();
        match outcome {
            FallbackOutcome::Failed(AuthError::Fallback(err)) => {
                assert_eq!(err.code, DialogErrorCode::CannotLoadPage)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(h.auth.state(), DialogState::FailedVisibly);
        assert_eq!(h.diagnostics.reports()[0].code.as_deref(), Some("12002"));
        assert_eq!(h.host.closes(), 1);
    }

    #[tokio::test]
    async fn test_error_envelope_is_surfaced() {
        let h = harness(ScriptedDialogHost::with_events(vec![message(json!({
            "status": "error",
            "error": { "errorMessage": "AADSTS50011: redirect mismatch" },
        }))]));

        match h.auth.authenticate().await.unwrap() {
            FallbackOutcome::Failed(AuthError::DialogReported(text)) => {
                assert_eq!(text, "AADSTS50011: redirect mismatch")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_envelope_is_visible_failure() {
        let h = harness(ScriptedDialogHost::with_events(vec![message(json!({ "hello": 1 }))]));

        assert!(matches!(
            h.auth.authenticate().await.unwrap(),
            FallbackOutcome::Failed(AuthError::InvalidDialogMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_undecodable_token_fails_attempt() {
        let h = harness(ScriptedDialogHost::with_events(vec![message(json!({
            "status": "success",
            "accessToken": "garbage",
            "accountId": "a",
        }))]));

        assert!(matches!(
            h.auth.authenticate().await.unwrap(),
            FallbackOutcome::Failed(AuthError::Decode(_))
        ));
        assert_eq!(h.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_origin_messages_are_ignored() {
        let h = harness(ScriptedDialogHost::with_events(vec![
            DialogEvent::Message {
                message: json!({ "status": "error", "error": "spoofed" }).to_string(),
                origin: "https://evil.example".to_string(),
            },
            success(json!({})),
        ]));

        assert!(matches!(
            h.auth.authenticate().await.unwrap(),
            FallbackOutcome::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn test_open_failure_is_visible() {
        let host = ScriptedDialogHost::default();
        host.push(Err(DialogHostError::new(12011, "blocked")));
        let h = harness(host);

        match h.auth.authenticate().await.unwrap() {
            FallbackOutcome::Failed(AuthError::Fallback(err)) => {
                assert_eq!(err.code, DialogErrorCode::BlockedByBrowser)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(h.auth.state(), DialogState::FailedVisibly);
        assert_eq!(h.host.closes(), 0);
    }

    #[tokio::test]
    async fn test_close_failure_is_swallowed() {
        let host = ScriptedDialogHost::with_close_failure();
        host.push(Ok(vec![success(json!({}))]));
        let h = harness(host);

        assert!(matches!(
            h.auth.authenticate().await.unwrap(),
            FallbackOutcome::Authenticated(_)
        ));
        assert_eq!(h.host.closes(), 1);
    }

    #[tokio::test]
    async fn test_second_attempt_while_open_is_rejected() {
        let host = ScriptedDialogHost::held_open();
        host.push(Ok(Vec::new()));
        let h = Arc::new(harness(host));

        let first = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.auth.authenticate().await.map(|_| ()) })
        };
        while !h.auth.is_authenticating() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            h.auth.authenticate().await,
            Err(AuthError::DialogAlreadyOpen)
        ));
        assert_eq!(h.host.opens(), 1);

        first.abort();
        let _ = first.await;
        assert!(!h.auth.is_authenticating());
        assert_eq!(h.auth.state(), DialogState::FailedSilently);
        assert_eq!(h.host.closes(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_failure_reopens_dialog() {
        let host = ScriptedDialogHost::with_events(vec![DialogEvent::LifecycleError { code: 12002 }]);
        host.push(Ok(vec![success(json!({}))]));
        let h = harness(host);

        assert!(matches!(
            h.auth.authenticate().await.unwrap(),
            FallbackOutcome::Failed(_)
        ));
        assert!(matches!(
            h.auth.authenticate().await.unwrap(),
            FallbackOutcome::Authenticated(_)
        ));
        assert_eq!(h.host.opens(), 2);
    }
}
