//! Cross-module integration: credential flow, dispatch recovery, export
//! reuse, polling, and pattern browsing against a scripted backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use telecon::api::types::*;
use telecon::api::AccountApi;
use telecon::auth::{AuthFlow, AuthStep, CodeEntry, PasswordEntry};
use telecon::config::PollConfig;
use telecon::console::{Action, Console, ExportKind, OpReport, SessionHandle};
use telecon::error::{ApiError, Rejection};
use telecon::notify::{ConfirmPrompt, Notifier};
use telecon::patterns::PatternBrowser;

/// Backend double: canned payloads per endpoint, a call counter, and a
/// generic rejection for everything left unscripted.
#[derive(Default)]
struct ScriptedApi {
    calls: Mutex<HashMap<String, usize>>,
    code_requires_2fa: AtomicBool,
    last_exports: Mutex<Option<LastExports>>,
    export_receipt: Mutex<Option<ExportReceipt>>,
    artifact: Mutex<Option<ArtifactFile>>,
    metrics: Mutex<HashMap<String, MetricsSnapshot>>,
    metrics_failures: Mutex<Vec<String>>,
    pattern_index: Mutex<Option<PatternIndex>>,
    two_factor: Mutex<Option<Outcome<TwoFactorStatus>>>,
}

impl ScriptedApi {
    fn count(&self, name: &str) -> usize {
        *self.calls.lock().unwrap().get(name).unwrap_or(&0)
    }

    fn bump(&self, name: &str) {
        *self.calls.lock().unwrap().entry(name.to_string()).or_insert(0) += 1;
    }

    fn unscripted<T>(&self, name: &str) -> Result<Outcome<T>, ApiError> {
        Ok(Outcome::Rejected(Rejection::new(
            format!("unscripted call: {name}"),
            None,
        )))
    }
}

#[async_trait]
impl AccountApi for ScriptedApi {
    async fn check_connection(&self) -> Result<ConnectionStatus, ApiError> {
        self.bump("check_connection");
        Ok(ConnectionStatus::default())
    }

    async fn send_code(&self, req: SendCodeRequest) -> Result<Outcome<CodeDispatch>, ApiError> {
        self.bump("send_code");
        assert!(req.phone_number.starts_with('+'));
        Ok(Outcome::Success(CodeDispatch {
            phone_code_hash: "hash-1".to_string(),
            sent_to: Some("+1555***67".to_string()),
            expire_seconds: Some(30),
            ..Default::default()
        }))
    }

    async fn send_email_code(
        &self,
        _req: EmailCodeRequest,
    ) -> Result<Outcome<EmailDispatch>, ApiError> {
        self.bump("send_email_code");
        self.unscripted("send_email_code")
    }

    async fn verify_email_code(
        &self,
        _req: VerifyEmailCodeRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.bump("verify_email_code");
        self.unscripted("verify_email_code")
    }

    async fn verify_code(
        &self,
        req: VerifyCodeRequest,
    ) -> Result<Outcome<CodeVerification>, ApiError> {
        self.bump("verify_code");
        assert_eq!(req.phone_code_hash, "hash-1");
        Ok(Outcome::Success(CodeVerification {
            requires_2fa: self.code_requires_2fa.load(Ordering::SeqCst),
        }))
    }

    async fn verify_password(
        &self,
        req: VerifyPasswordRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.bump("verify_password");
        if req.password == "rotated-secret" {
            Ok(Outcome::Success(Ack::default()))
        } else {
            Ok(Outcome::Rejected(Rejection::new("wrong password", None)))
        }
    }

    async fn reset_two_factor(&self, _phone: &str) -> Result<Outcome<ResetDispatch>, ApiError> {
        self.bump("reset_two_factor");
        Ok(Outcome::Success(ResetDispatch {
            masked_email: Some("a***@mail.com".to_string()),
        }))
    }

    async fn change_two_factor_password(
        &self,
        req: ChangeTwoFactorPasswordRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.bump("change_two_factor_password");
        assert_eq!(req.new_password, "rotated-secret");
        Ok(Outcome::Success(Ack::default()))
    }

    async fn sessions(&self) -> Result<Vec<SessionRecord>, ApiError> {
        self.bump("sessions");
        Ok(vec![SessionRecord {
            id: 7,
            phone_number: "+15551234567".to_string(),
            is_active: true,
            created_at: None,
            last_used_at: None,
            owner: None,
        }])
    }

    async fn session(&self, _id: i64) -> Result<Option<SessionRecord>, ApiError> {
        self.bump("session");
        Ok(None)
    }

    async fn delete_session(&self, _id: i64) -> Result<bool, ApiError> {
        self.bump("delete_session");
        Ok(true)
    }

    async fn session_history(&self, _id: i64) -> Result<Vec<SessionHistoryEntry>, ApiError> {
        self.bump("session_history");
        Ok(Vec::new())
    }

    async fn user_info(&self, _phone: &str) -> Result<Outcome<UserProfile>, ApiError> {
        self.bump("user_info");
        Ok(Outcome::Success(UserProfile {
            username: Some("ghost".to_string()),
            ..Default::default()
        }))
    }

    async fn export_contacts(&self, _phone: &str) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.bump("export_contacts");
        match self.export_receipt.lock().unwrap().clone() {
            Some(receipt) => Ok(Outcome::Success(receipt)),
            None => self.unscripted("export_contacts"),
        }
    }

    async fn export_chats(&self, _phone: &str) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.bump("export_chats");
        self.unscripted("export_chats")
    }

    async fn export_saved_messages(
        &self,
        _phone: &str,
    ) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.bump("export_saved_messages");
        self.unscripted("export_saved_messages")
    }

    async fn export_dialog(
        &self,
        _phone: &str,
        _peer: &str,
    ) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.bump("export_dialog");
        self.unscripted("export_dialog")
    }

    async fn export_contact_photos(
        &self,
        _phone: &str,
    ) -> Result<Outcome<ContactsExport>, ApiError> {
        self.bump("export_contact_photos");
        self.unscripted("export_contact_photos")
    }

    async fn fetch_avatar(&self, _phone: &str) -> Result<Outcome<AvatarUpdate>, ApiError> {
        self.bump("fetch_avatar");
        self.unscripted("fetch_avatar")
    }

    async fn scan_balance(&self, _phone: &str) -> Result<Outcome<BalanceReport>, ApiError> {
        self.bump("scan_balance");
        self.unscripted("scan_balance")
    }

    async fn run_pattern_scan(&self, _phone: &str) -> Result<Outcome<PatternScan>, ApiError> {
        self.bump("run_pattern_scan");
        Ok(Outcome::Success(PatternScan {
            existing: false,
            matches: Some(120),
            bundles: Some(120),
        }))
    }

    async fn pattern_index(&self, _phone: &str) -> Result<Outcome<PatternIndex>, ApiError> {
        self.bump("pattern_index");
        match self.pattern_index.lock().unwrap().clone() {
            Some(index) => Ok(Outcome::Success(index)),
            None => self.unscripted("pattern_index"),
        }
    }

    async fn pattern_bundle(
        &self,
        _phone: &str,
        _chat_id: i64,
        _match_id: &str,
    ) -> Result<Outcome<BundleEnvelope>, ApiError> {
        self.bump("pattern_bundle");
        Ok(Outcome::Success(BundleEnvelope::default()))
    }

    async fn session_metrics(&self, phone: &str) -> Result<Outcome<MetricsSnapshot>, ApiError> {
        self.bump("session_metrics");
        if self.metrics_failures.lock().unwrap().contains(&phone.to_string()) {
            return Err(ApiError::UnexpectedStatus {
                endpoint: "metrics".to_string(),
                status: 503,
            });
        }
        match self.metrics.lock().unwrap().get(phone).cloned() {
            Some(snapshot) => Ok(Outcome::Success(snapshot)),
            None => self.unscripted("session_metrics"),
        }
    }

    async fn login_email_status(
        &self,
        _phone: &str,
    ) -> Result<Outcome<LoginEmailStatus>, ApiError> {
        self.bump("login_email_status");
        self.unscripted("login_email_status")
    }

    async fn last_exports(&self, _phone: &str) -> Result<Outcome<LastExports>, ApiError> {
        self.bump("last_exports");
        match self.last_exports.lock().unwrap().clone() {
            Some(last) => Ok(Outcome::Success(last)),
            None => self.unscripted("last_exports"),
        }
    }

    async fn check_two_factor(&self, _phone: &str) -> Result<Outcome<TwoFactorStatus>, ApiError> {
        self.bump("check_two_factor");
        match self.two_factor.lock().unwrap().take() {
            Some(outcome) => Ok(outcome),
            None => self.unscripted("check_two_factor"),
        }
    }

    async fn session_log(&self, _phone: &str, _lines: usize) -> Result<Outcome<LogTail>, ApiError> {
        self.bump("session_log");
        Ok(Outcome::Success(LogTail {
            text: "ok".to_string(),
            ..Default::default()
        }))
    }

    async fn silence_service_notifications(
        &self,
        _phone: &str,
    ) -> Result<Outcome<AutomationSummary>, ApiError> {
        self.bump("silence_service_notifications");
        self.unscripted("silence_service_notifications")
    }

    async fn set_two_factor_email(
        &self,
        _req: TwoFactorEmailRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.bump("set_two_factor_email");
        self.unscripted("set_two_factor_email")
    }

    async fn change_login_email_send(
        &self,
        _phone: &str,
        _new_email: &str,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.bump("change_login_email_send");
        self.unscripted("change_login_email_send")
    }

    async fn change_login_email_verify(
        &self,
        _phone: &str,
        _new_email: &str,
        _code: &str,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.bump("change_login_email_verify");
        self.unscripted("change_login_email_verify")
    }

    async fn auto_change_login_email(
        &self,
        _phone: &str,
    ) -> Result<Outcome<EmailRotation>, ApiError> {
        self.bump("auto_change_login_email");
        Ok(Outcome::Success(EmailRotation {
            old_email: None,
            new_email: Some("fresh@rotated.example".to_string()),
        }))
    }

    async fn terminate_other_sessions(&self, _phone: &str) -> Result<Outcome<Ack>, ApiError> {
        self.bump("terminate_other_sessions");
        self.unscripted("terminate_other_sessions")
    }

    async fn fetch_export_file(
        &self,
        _session_id: i64,
        _file_name: &str,
    ) -> Result<ArtifactFile, ApiError> {
        self.bump("fetch_export_file");
        match self.artifact.lock().unwrap().clone() {
            Some(file) => Ok(file),
            None => Err(ApiError::UnexpectedStatus {
                endpoint: "exports".to_string(),
                status: 404,
            }),
        }
    }
}

struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn info(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

struct AlwaysConfirm(bool);

impl ConfirmPrompt for AlwaysConfirm {
    fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

fn console_with(api: Arc<ScriptedApi>, confirm: bool) -> Console {
    Console::new(
        api,
        Arc::new(SilentNotifier),
        Arc::new(AlwaysConfirm(confirm)),
        PollConfig::default(),
    )
}

fn handle() -> SessionHandle {
    SessionHandle {
        id: 7,
        phone: "+15551234567".to_string(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn full_takeover_flow_with_password_reset() {
    let api = Arc::new(ScriptedApi::default());
    api.code_requires_2fa.store(true, Ordering::SeqCst);

    let mut flow = AuthFlow::new(api.clone(), Arc::new(SilentNotifier));

    // Raw operator input is normalized before the remote call sees it.
    flow.send_code("1 (555) 123-45-67", false).await;
    assert_eq!(flow.step(), AuthStep::Code(CodeEntry::Normal));
    assert_eq!(flow.cooldown_remaining(), 30);

    flow.verify_code("11111").await;
    assert_eq!(flow.step(), AuthStep::Password(PasswordEntry::Enter));

    // Forgot the 2FA password: reset it via the emailed code.
    flow.forgot_password();
    flow.request_reset_code().await;
    assert_eq!(flow.masked_email(), Some("a***@mail.com"));
    flow.change_password("9999", "rotated-secret").await;
    assert_eq!(flow.step(), AuthStep::Password(PasswordEntry::Enter));

    flow.verify_password("rotated-secret").await;
    assert_eq!(flow.step(), AuthStep::Success);

    // The post-success rotation task ran against the backend.
    flow.take_side_task().expect("side task").await.unwrap();
    assert_eq!(api.count("auto_change_login_email"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthenticated_operation_offers_the_login_flow() {
    let api = Arc::new(ScriptedApi::default());
    // The hint a real envelope decode would attach at the boundary.
    *api.two_factor.lock().unwrap() = Some(Outcome::Rejected(Rejection::new(
        "Session is not authorized",
        classify_hint("Session is not authorized"),
    )));
    let console = console_with(api.clone(), true);

    let report = console.run(&handle(), Action::CheckTwoFactor).await;
    assert!(matches!(report, OpReport::ReauthRequested));
}

#[tokio::test(flavor = "multi_thread")]
async fn existing_artifact_short_circuits_the_export() {
    let api = Arc::new(ScriptedApi::default());
    *api.last_exports.lock().unwrap() = Some(LastExports {
        files: ExportFiles {
            contacts: Some("contacts_7.csv".to_string()),
            ..Default::default()
        },
    });
    *api.artifact.lock().unwrap() = Some(ArtifactFile {
        content: "name,phone\nAnna,+1".to_string(),
        content_type: "text/csv".to_string(),
    });
    let console = console_with(api.clone(), true);

    let report = console
        .run(&handle(), Action::Export(ExportKind::Contacts))
        .await;
    assert!(report.completed());
    assert_eq!(api.count("export_contacts"), 0);
    assert_eq!(api.count("fetch_export_file"), 1);
    assert_eq!(
        console.download(7).map(|d| d.file_name),
        Some("contacts_7.csv".to_string())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn metrics_polling_merges_and_survives_partial_failure() {
    let api = Arc::new(ScriptedApi::default());
    api.metrics.lock().unwrap().insert(
        "+15551234567".to_string(),
        MetricsSnapshot {
            is_authorized: Some(true),
            dialogs_count: Some(42),
            ..Default::default()
        },
    );
    // A second, permanently failing session must not poison the batch.
    api.metrics_failures
        .lock()
        .unwrap()
        .push("+15550000000".to_string());

    let console = console_with(api.clone(), true);
    console
        .poller()
        .watch(vec!["+15551234567".to_string(), "+15550000000".to_string()]);

    let mut metrics = None;
    for _ in 0..100 {
        metrics = console.poller().metrics("+15551234567");
        if metrics.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let metrics = metrics.expect("metrics for the healthy session");
    assert_eq!(metrics.dialogs_count, Some(42));
    assert!(console.poller().metrics("+15550000000").is_none());
    assert_eq!(console.poller().liveness("+15551234567"), Some(true));

    console.poller().shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn pattern_browser_pages_through_a_large_index() {
    let api = Arc::new(ScriptedApi::default());
    let bundles: Vec<BundleSummary> = (0..100)
        .map(|i| BundleSummary {
            match_id: format!("m-{i}"),
            date: None,
            text_excerpt: format!("excerpt {i}"),
        })
        .collect();
    *api.pattern_index.lock().unwrap() = Some(PatternIndex {
        index: vec![ChatSummary {
            chat_id: 1,
            chat_name: "big chat".to_string(),
            bundles,
        }],
    });

    let mut browser = PatternBrowser::new(api.clone(), 40);
    assert_eq!(browser.load_index("+15551234567").await.unwrap(), 1);
    assert!(browser.select_chat(1));

    assert_eq!(browser.visible_matches().len(), 40);
    assert_eq!(browser.show_more_matches(), 80);
    assert_eq!(browser.show_more_matches(), 100);
    assert_eq!(browser.show_more_matches(), 100);

    // Insertion order is preserved at every page boundary.
    assert_eq!(browser.visible_matches()[0].match_id, "m-0");
    assert_eq!(browser.visible_matches()[99].match_id, "m-99");
}
