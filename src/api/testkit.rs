//! Scripted `AccountApi` for unit tests.
//!
//! Each endpoint has a FIFO of scripted results; an unscripted call is
//! recorded and answered with a generic rejection so tests fail loudly on
//! unexpected traffic instead of hanging.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ApiError, ErrorHint, Rejection};

use super::AccountApi;
use super::types::*;

pub(crate) fn ok<T>(data: T) -> Result<Outcome<T>, ApiError> {
    Ok(Outcome::Success(data))
}

pub(crate) fn rejected<T>(message: &str, hint: Option<ErrorHint>) -> Result<Outcome<T>, ApiError> {
    Ok(Outcome::Rejected(Rejection::new(
        message,
        hint.or_else(|| classify_hint(message)),
    )))
}

pub(crate) fn transport_err<T>() -> Result<Outcome<T>, ApiError> {
    Err(ApiError::UnexpectedStatus {
        endpoint: "mock".to_string(),
        status: 503,
    })
}

type Scripted<T> = Mutex<VecDeque<Result<Outcome<T>, ApiError>>>;

#[derive(Default)]
pub(crate) struct MockAccountApi {
    calls: Mutex<Vec<String>>,
    connection: Mutex<VecDeque<Result<ConnectionStatus, ApiError>>>,
    send_code: Scripted<CodeDispatch>,
    send_email_code: Scripted<EmailDispatch>,
    verify_email_code: Scripted<Ack>,
    verify_code: Scripted<CodeVerification>,
    verify_password: Scripted<Ack>,
    reset_two_factor: Scripted<ResetDispatch>,
    change_two_factor_password: Scripted<Ack>,
    sessions: Mutex<VecDeque<Result<Vec<SessionRecord>, ApiError>>>,
    session_get: Mutex<VecDeque<Result<Option<SessionRecord>, ApiError>>>,
    delete_session: Mutex<VecDeque<Result<bool, ApiError>>>,
    session_history: Mutex<VecDeque<Result<Vec<SessionHistoryEntry>, ApiError>>>,
    user_info: Scripted<UserProfile>,
    export_contacts: Scripted<ExportReceipt>,
    export_chats: Scripted<ExportReceipt>,
    export_saved: Scripted<ExportReceipt>,
    export_dialog: Scripted<ExportReceipt>,
    export_contact_photos: Scripted<ContactsExport>,
    fetch_avatar: Scripted<AvatarUpdate>,
    scan_balance: Scripted<BalanceReport>,
    run_pattern_scan: Scripted<PatternScan>,
    pattern_index: Scripted<PatternIndex>,
    pattern_bundle: Scripted<BundleEnvelope>,
    metrics_by_phone: Mutex<HashMap<String, VecDeque<Result<Outcome<MetricsSnapshot>, ApiError>>>>,
    login_email_status: Scripted<LoginEmailStatus>,
    last_exports: Scripted<LastExports>,
    check_two_factor: Scripted<TwoFactorStatus>,
    session_log: Scripted<LogTail>,
    silence: Scripted<AutomationSummary>,
    set_two_factor_email: Scripted<Ack>,
    change_login_email_send: Scripted<Ack>,
    change_login_email_verify: Scripted<Ack>,
    auto_change_login_email: Scripted<EmailRotation>,
    terminate_other_sessions: Scripted<Ack>,
    artifacts: Mutex<VecDeque<Result<ArtifactFile, ApiError>>>,
}

macro_rules! script_fns {
    ($($fn_name:ident => $field:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name(&self, result: Result<Outcome<$ty>, ApiError>) {
                self.$field.lock().unwrap().push_back(result);
            }
        )*
    };
}

impl MockAccountApi {
    pub(crate) fn call_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn pop<T>(&self, name: &str, queue: &Scripted<T>) -> Result<Outcome<T>, ApiError> {
        self.record(name);
        queue.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(Outcome::Rejected(Rejection::new(
                format!("unscripted call: {name}"),
                None,
            )))
        })
    }

    script_fns! {
        script_send_code => send_code: CodeDispatch,
        script_send_email_code => send_email_code: EmailDispatch,
        script_verify_email_code => verify_email_code: Ack,
        script_verify_code => verify_code: CodeVerification,
        script_verify_password => verify_password: Ack,
        script_reset_two_factor => reset_two_factor: ResetDispatch,
        script_change_two_factor_password => change_two_factor_password: Ack,
        script_user_info => user_info: UserProfile,
        script_export_contacts => export_contacts: ExportReceipt,
        script_export_dialog => export_dialog: ExportReceipt,
        script_fetch_avatar => fetch_avatar: AvatarUpdate,
        script_pattern_index => pattern_index: PatternIndex,
        script_pattern_bundle => pattern_bundle: BundleEnvelope,
        script_login_email_status => login_email_status: LoginEmailStatus,
        script_last_exports => last_exports: LastExports,
        script_check_two_factor => check_two_factor: TwoFactorStatus,
        script_session_log => session_log: LogTail,
        script_auto_change_login_email => auto_change_login_email: EmailRotation,
    }

    pub(crate) fn script_delete_session(&self, result: Result<bool, ApiError>) {
        self.delete_session.lock().unwrap().push_back(result);
    }

    pub(crate) fn script_metrics(
        &self,
        phone: &str,
        result: Result<Outcome<MetricsSnapshot>, ApiError>,
    ) {
        self.metrics_by_phone
            .lock()
            .unwrap()
            .entry(phone.to_string())
            .or_default()
            .push_back(result);
    }

    pub(crate) fn script_artifact(&self, result: Result<ArtifactFile, ApiError>) {
        self.artifacts.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl AccountApi for MockAccountApi {
    async fn check_connection(&self) -> Result<ConnectionStatus, ApiError> {
        self.record("check_connection");
        self.connection
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ConnectionStatus::default()))
    }

    async fn send_code(&self, _req: SendCodeRequest) -> Result<Outcome<CodeDispatch>, ApiError> {
        self.pop("send_code", &self.send_code)
    }

    async fn send_email_code(
        &self,
        _req: EmailCodeRequest,
    ) -> Result<Outcome<EmailDispatch>, ApiError> {
        self.pop("send_email_code", &self.send_email_code)
    }

    async fn verify_email_code(
        &self,
        _req: VerifyEmailCodeRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.pop("verify_email_code", &self.verify_email_code)
    }

    async fn verify_code(
        &self,
        _req: VerifyCodeRequest,
    ) -> Result<Outcome<CodeVerification>, ApiError> {
        self.pop("verify_code", &self.verify_code)
    }

    async fn verify_password(
        &self,
        _req: VerifyPasswordRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.pop("verify_password", &self.verify_password)
    }

    async fn reset_two_factor(&self, _phone: &str) -> Result<Outcome<ResetDispatch>, ApiError> {
        self.pop("reset_two_factor", &self.reset_two_factor)
    }

    async fn change_two_factor_password(
        &self,
        _req: ChangeTwoFactorPasswordRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.pop("change_two_factor_password", &self.change_two_factor_password)
    }

    async fn sessions(&self) -> Result<Vec<SessionRecord>, ApiError> {
        self.record("sessions");
        self.sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn session(&self, _id: i64) -> Result<Option<SessionRecord>, ApiError> {
        self.record("session");
        self.session_get
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(None))
    }

    async fn delete_session(&self, _id: i64) -> Result<bool, ApiError> {
        self.record("delete_session");
        self.delete_session
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(false))
    }

    async fn session_history(&self, _id: i64) -> Result<Vec<SessionHistoryEntry>, ApiError> {
        self.record("session_history");
        self.session_history
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn user_info(&self, _phone: &str) -> Result<Outcome<UserProfile>, ApiError> {
        self.pop("user_info", &self.user_info)
    }

    async fn export_contacts(&self, _phone: &str) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.pop("export_contacts", &self.export_contacts)
    }

    async fn export_chats(&self, _phone: &str) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.pop("export_chats", &self.export_chats)
    }

    async fn export_saved_messages(
        &self,
        _phone: &str,
    ) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.pop("export_saved_messages", &self.export_saved)
    }

    async fn export_dialog(
        &self,
        _phone: &str,
        _peer: &str,
    ) -> Result<Outcome<ExportReceipt>, ApiError> {
        self.pop("export_dialog", &self.export_dialog)
    }

    async fn export_contact_photos(
        &self,
        _phone: &str,
    ) -> Result<Outcome<ContactsExport>, ApiError> {
        self.pop("export_contact_photos", &self.export_contact_photos)
    }

    async fn fetch_avatar(&self, _phone: &str) -> Result<Outcome<AvatarUpdate>, ApiError> {
        self.pop("fetch_avatar", &self.fetch_avatar)
    }

    async fn scan_balance(&self, _phone: &str) -> Result<Outcome<BalanceReport>, ApiError> {
        self.pop("scan_balance", &self.scan_balance)
    }

    async fn run_pattern_scan(&self, _phone: &str) -> Result<Outcome<PatternScan>, ApiError> {
        self.pop("run_pattern_scan", &self.run_pattern_scan)
    }

    async fn pattern_index(&self, _phone: &str) -> Result<Outcome<PatternIndex>, ApiError> {
        self.pop("pattern_index", &self.pattern_index)
    }

    async fn pattern_bundle(
        &self,
        _phone: &str,
        _chat_id: i64,
        _match_id: &str,
    ) -> Result<Outcome<BundleEnvelope>, ApiError> {
        self.pop("pattern_bundle", &self.pattern_bundle)
    }

    async fn session_metrics(&self, phone: &str) -> Result<Outcome<MetricsSnapshot>, ApiError> {
        self.record("session_metrics");
        self.metrics_by_phone
            .lock()
            .unwrap()
            .get_mut(phone)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Ok(Outcome::Rejected(Rejection::new(
                    format!("unscripted metrics for {phone}"),
                    None,
                )))
            })
    }

    async fn login_email_status(
        &self,
        _phone: &str,
    ) -> Result<Outcome<LoginEmailStatus>, ApiError> {
        self.pop("login_email_status", &self.login_email_status)
    }

    async fn last_exports(&self, _phone: &str) -> Result<Outcome<LastExports>, ApiError> {
        self.pop("last_exports", &self.last_exports)
    }

    async fn check_two_factor(&self, _phone: &str) -> Result<Outcome<TwoFactorStatus>, ApiError> {
        self.pop("check_two_factor", &self.check_two_factor)
    }

    async fn session_log(&self, _phone: &str, _lines: usize) -> Result<Outcome<LogTail>, ApiError> {
        self.pop("session_log", &self.session_log)
    }

    async fn silence_service_notifications(
        &self,
        _phone: &str,
    ) -> Result<Outcome<AutomationSummary>, ApiError> {
        self.pop("silence_service_notifications", &self.silence)
    }

    async fn set_two_factor_email(
        &self,
        _req: TwoFactorEmailRequest,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.pop("set_two_factor_email", &self.set_two_factor_email)
    }

    async fn change_login_email_send(
        &self,
        _phone: &str,
        _new_email: &str,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.pop("change_login_email_send", &self.change_login_email_send)
    }

    async fn change_login_email_verify(
        &self,
        _phone: &str,
        _new_email: &str,
        _code: &str,
    ) -> Result<Outcome<Ack>, ApiError> {
        self.pop("change_login_email_verify", &self.change_login_email_verify)
    }

    async fn auto_change_login_email(
        &self,
        _phone: &str,
    ) -> Result<Outcome<EmailRotation>, ApiError> {
        self.pop("auto_change_login_email", &self.auto_change_login_email)
    }

    async fn terminate_other_sessions(&self, _phone: &str) -> Result<Outcome<Ack>, ApiError> {
        self.pop("terminate_other_sessions", &self.terminate_other_sessions)
    }

    async fn fetch_export_file(
        &self,
        _session_id: i64,
        _file_name: &str,
    ) -> Result<ArtifactFile, ApiError> {
        self.record("fetch_export_file");
        self.artifacts.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ApiError::UnexpectedStatus {
                endpoint: "exports".to_string(),
                status: 404,
            })
        })
    }
}
