//! Remote account boundary.
//!
//! `AccountApi` is the single interface the console consumes: the credential
//! verification protocol, the per-session operation catalogue, and artifact
//! download. The production implementation is [`http::HttpAccountApi`];
//! tests substitute scripted implementations.

pub mod http;
#[cfg(test)]
pub(crate) mod testkit;
pub mod types;

use async_trait::async_trait;

use crate::error::ApiError;
use types::*;

/// Everything the console asks of the remote account backend.
///
/// Operational endpoints return `Outcome<T>`: a structured success payload or
/// a `Rejection`. Only transport/protocol failures surface as `ApiError`.
#[async_trait]
pub trait AccountApi: Send + Sync {
    // --- credential verification protocol ---

    async fn check_connection(&self) -> Result<ConnectionStatus, ApiError>;

    async fn send_code(&self, req: SendCodeRequest) -> Result<Outcome<CodeDispatch>, ApiError>;

    async fn send_email_code(
        &self,
        req: EmailCodeRequest,
    ) -> Result<Outcome<EmailDispatch>, ApiError>;

    async fn verify_email_code(
        &self,
        req: VerifyEmailCodeRequest,
    ) -> Result<Outcome<Ack>, ApiError>;

    async fn verify_code(
        &self,
        req: VerifyCodeRequest,
    ) -> Result<Outcome<CodeVerification>, ApiError>;

    async fn verify_password(&self, req: VerifyPasswordRequest)
    -> Result<Outcome<Ack>, ApiError>;

    async fn reset_two_factor(&self, phone: &str) -> Result<Outcome<ResetDispatch>, ApiError>;

    async fn change_two_factor_password(
        &self,
        req: ChangeTwoFactorPasswordRequest,
    ) -> Result<Outcome<Ack>, ApiError>;

    // --- session records ---

    async fn sessions(&self) -> Result<Vec<SessionRecord>, ApiError>;

    async fn session(&self, id: i64) -> Result<Option<SessionRecord>, ApiError>;

    async fn delete_session(&self, id: i64) -> Result<bool, ApiError>;

    async fn session_history(&self, id: i64) -> Result<Vec<SessionHistoryEntry>, ApiError>;

    // --- account operations ---

    async fn user_info(&self, phone: &str) -> Result<Outcome<UserProfile>, ApiError>;

    async fn export_contacts(&self, phone: &str) -> Result<Outcome<ExportReceipt>, ApiError>;

    async fn export_chats(&self, phone: &str) -> Result<Outcome<ExportReceipt>, ApiError>;

    async fn export_saved_messages(&self, phone: &str)
    -> Result<Outcome<ExportReceipt>, ApiError>;

    async fn export_dialog(
        &self,
        phone: &str,
        peer: &str,
    ) -> Result<Outcome<ExportReceipt>, ApiError>;

    async fn export_contact_photos(&self, phone: &str)
    -> Result<Outcome<ContactsExport>, ApiError>;

    async fn fetch_avatar(&self, phone: &str) -> Result<Outcome<AvatarUpdate>, ApiError>;

    async fn scan_balance(&self, phone: &str) -> Result<Outcome<BalanceReport>, ApiError>;

    async fn run_pattern_scan(&self, phone: &str) -> Result<Outcome<PatternScan>, ApiError>;

    async fn pattern_index(&self, phone: &str) -> Result<Outcome<PatternIndex>, ApiError>;

    async fn pattern_bundle(
        &self,
        phone: &str,
        chat_id: i64,
        match_id: &str,
    ) -> Result<Outcome<BundleEnvelope>, ApiError>;

    async fn session_metrics(&self, phone: &str) -> Result<Outcome<MetricsSnapshot>, ApiError>;

    async fn login_email_status(&self, phone: &str)
    -> Result<Outcome<LoginEmailStatus>, ApiError>;

    async fn last_exports(&self, phone: &str) -> Result<Outcome<LastExports>, ApiError>;

    async fn check_two_factor(&self, phone: &str) -> Result<Outcome<TwoFactorStatus>, ApiError>;

    async fn session_log(&self, phone: &str, lines: usize) -> Result<Outcome<LogTail>, ApiError>;

    /// Walk the service-notification channel and archive/clear it.
    async fn silence_service_notifications(
        &self,
        phone: &str,
    ) -> Result<Outcome<AutomationSummary>, ApiError>;

    async fn set_two_factor_email(
        &self,
        req: TwoFactorEmailRequest,
    ) -> Result<Outcome<Ack>, ApiError>;

    async fn change_login_email_send(
        &self,
        phone: &str,
        new_email: &str,
    ) -> Result<Outcome<Ack>, ApiError>;

    async fn change_login_email_verify(
        &self,
        phone: &str,
        new_email: &str,
        code: &str,
    ) -> Result<Outcome<Ack>, ApiError>;

    async fn auto_change_login_email(
        &self,
        phone: &str,
    ) -> Result<Outcome<EmailRotation>, ApiError>;

    async fn terminate_other_sessions(&self, phone: &str) -> Result<Outcome<Ack>, ApiError>;

    // --- artifacts ---

    async fn fetch_export_file(
        &self,
        session_id: i64,
        file_name: &str,
    ) -> Result<ArtifactFile, ApiError>;
}
