//! The credential-verification state machine.
//!
//! One flow instance drives one takeover attempt:
//!
//! ```text
//! Phone --send_code--> Code{Normal | EmailVerification}
//! Code::EmailVerification --send_email_code/verify_email_code--> Code::Normal
//! Code::Normal --verify_code--> Password::Enter | Success
//! Password::Enter --verify_password--> Success
//! Password::Enter --forgot_password--> Password::Reset
//! Password::Reset --request_reset_code/change_password--> Password::Enter
//! ```
//!
//! Exactly one step is active at a time, transitions are strictly
//! sequential (an `in_flight` flag drops re-entrant triggers while a remote
//! call is outstanding), and every failure comes back as a `Rejection`
//! (transport errors included), so the caller decides whether to retry,
//! prompt again, or abort.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::api::types::{
    ChangeTwoFactorPasswordRequest, EmailCodeRequest, Outcome, SendCodeRequest,
    VerifyCodeRequest, VerifyEmailCodeRequest, VerifyPasswordRequest, classify_hint,
};
use crate::api::AccountApi;
use crate::error::{ApiError, ErrorHint, Rejection, redact_sensitive_detail};
use crate::notify::Notifier;

use super::cooldown::ResendCooldown;
use super::phone::{is_plausible_phone, normalize_phone};

/// Current step of the flow. The nested variants make illegal combinations
/// (e.g. "email verification while entering the 2FA password")
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    Phone,
    Code(CodeEntry),
    Password(PasswordEntry),
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeEntry {
    Normal,
    /// The code send is blocked until an out-of-band email code is verified.
    EmailVerification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordEntry {
    Enter,
    Reset,
}

/// Ephemeral state of one phone/code exchange. Discarded on success or
/// explicit cancellation; at most one lives per flow.
#[derive(Debug, Clone)]
pub struct CredentialAttempt {
    pub code_hash: String,
    pub sent_to: String,
    pub cooldown: ResendCooldown,
}

/// What a transition attempt amounted to.
#[derive(Debug)]
pub enum FlowReport {
    /// The transition completed; inspect `step()` for the new state.
    Progressed,
    /// Validation, the remote side, or the transport said no. State is
    /// unchanged unless the variant's transition says otherwise.
    Rejected(Rejection),
    /// Dropped without a remote call: a transition was already in flight,
    /// the resend cooldown has not elapsed, or the step does not admit this
    /// trigger.
    Suppressed,
}

impl FlowReport {
    pub fn progressed(&self) -> bool {
        matches!(self, FlowReport::Progressed)
    }
}

/// The auth state machine.
pub struct AuthFlow {
    api: Arc<dyn AccountApi>,
    notifier: Arc<dyn Notifier>,
    client_id: Option<i64>,
    step: AuthStep,
    phone: String,
    attempt: Option<CredentialAttempt>,
    email_pattern: Option<String>,
    masked_email: Option<String>,
    in_flight: bool,
    side_task: Option<JoinHandle<()>>,
}

impl AuthFlow {
    pub fn new(api: Arc<dyn AccountApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            client_id: None,
            step: AuthStep::Phone,
            phone: String::new(),
            attempt: None,
            email_pattern: None,
            masked_email: None,
            in_flight: false,
            side_task: None,
        }
    }

    /// Bind the takeover to a CRM client record.
    pub fn with_client_id(mut self, client_id: Option<i64>) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn step(&self) -> AuthStep {
        self.step
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    /// Descriptor of where the current code was delivered.
    pub fn sent_to(&self) -> Option<&str> {
        self.attempt.as_ref().map(|a| a.sent_to.as_str())
    }

    pub fn email_pattern(&self) -> Option<&str> {
        self.email_pattern.as_deref()
    }

    pub fn masked_email(&self) -> Option<&str> {
        self.masked_email.as_deref()
    }

    pub fn cooldown_remaining(&self) -> u32 {
        self.attempt
            .as_ref()
            .map(|a| a.cooldown.remaining())
            .unwrap_or(0)
    }

    /// One-second advisory tick; returns the remaining cooldown.
    pub fn tick_cooldown(&mut self) -> u32 {
        match self.attempt.as_mut() {
            Some(attempt) => attempt.cooldown.tick(),
            None => 0,
        }
    }

    /// The post-success email-rotation task, if one was spawned.
    pub fn take_side_task(&mut self) -> Option<JoinHandle<()>> {
        self.side_task.take()
    }

    // --- transitions -----------------------------------------------------

    /// `Phone -> Code`: validate the phone, run the connection check, and
    /// request a login code.
    pub async fn send_code(&mut self, raw_phone: &str, force_sms: bool) -> FlowReport {
        if self.in_flight {
            return FlowReport::Suppressed;
        }

        let phone = normalize_phone(raw_phone);
        if !is_plausible_phone(&phone) {
            let rejection = Rejection::new(
                format!("'{raw_phone}' is not a plausible international phone number"),
                Some(ErrorHint::InvalidPhone),
            );
            self.notifier.error(&rejection.message);
            return FlowReport::Rejected(rejection);
        }

        self.in_flight = true;
        let report = self.dispatch_code_send(phone, force_sms).await;
        self.in_flight = false;
        report
    }

    /// Re-enter the code send for the stored phone. Disabled while the
    /// cooldown runs: no remote call is issued at all.
    pub async fn resend(&mut self, force_sms: bool) -> FlowReport {
        if self.in_flight || !matches!(self.step, AuthStep::Code(_)) {
            return FlowReport::Suppressed;
        }
        if let Some(attempt) = &self.attempt
            && !attempt.cooldown.is_ready()
        {
            self.notifier.info(&format!(
                "resend available in {}s",
                attempt.cooldown.remaining()
            ));
            return FlowReport::Suppressed;
        }

        self.in_flight = true;
        let phone = self.phone.clone();
        let report = self.dispatch_code_send(phone, force_sms).await;
        self.in_flight = false;
        report
    }

    async fn dispatch_code_send(&mut self, phone: String, force_sms: bool) -> FlowReport {
        // Connection check first; the notice is informational but a broken
        // transport aborts the send like any other call.
        match self.api.check_connection().await {
            Ok(status) if status.proxy_connected => {
                let info = status.proxy_info.unwrap_or_default();
                if info.is_empty() {
                    self.notifier.info("connecting through mobile proxy");
                } else {
                    self.notifier
                        .info(&format!("connecting through mobile proxy: {info}"));
                }
            }
            Ok(_) => {
                self.notifier
                    .info("proxies unavailable, using the direct connection");
            }
            Err(e) => return self.transport_rejection(e),
        }

        let request = SendCodeRequest {
            phone_number: phone.clone(),
            client_id: self.client_id,
            force_sms,
        };
        match self.api.send_code(request).await {
            Ok(Outcome::Success(dispatch)) => {
                let sent_to = dispatch
                    .sent_to
                    .unwrap_or_else(|| "unknown destination".to_string());
                self.phone = phone;
                self.attempt = Some(CredentialAttempt {
                    code_hash: dispatch.phone_code_hash,
                    sent_to: sent_to.clone(),
                    cooldown: ResendCooldown::start(dispatch.expire_seconds),
                });

                if dispatch.requires_email_verification {
                    self.step = AuthStep::Code(CodeEntry::EmailVerification);
                    self.email_pattern = None;
                    self.notifier.success(&format!(
                        "email verification required; code sent to {sent_to}"
                    ));
                } else {
                    self.step = AuthStep::Code(CodeEntry::Normal);
                    self.notifier.success(&format!("code sent to {sent_to}"));
                }
                FlowReport::Progressed
            }
            Ok(Outcome::Rejected(rejection)) => self.reject(rejection),
            Err(e) => self.transport_rejection(e),
        }
    }

    /// Request the out-of-band email code (only while the email-verification
    /// sub-step is active).
    pub async fn send_email_code(&mut self, email: &str) -> FlowReport {
        if self.in_flight || self.step != AuthStep::Code(CodeEntry::EmailVerification) {
            return FlowReport::Suppressed;
        }
        let Some(attempt) = self.attempt.clone() else {
            return FlowReport::Suppressed;
        };

        self.in_flight = true;
        let request = EmailCodeRequest {
            phone_number: self.phone.clone(),
            phone_code_hash: attempt.code_hash,
            email: email.to_string(),
        };
        let report = match self.api.send_email_code(request).await {
            Ok(Outcome::Success(dispatch)) => {
                let pattern = dispatch
                    .email_pattern
                    .unwrap_or_else(|| "your email".to_string());
                self.notifier
                    .success(&format!("verification code sent to {pattern}"));
                self.email_pattern = Some(pattern);
                FlowReport::Progressed
            }
            Ok(Outcome::Rejected(rejection)) => self.reject(rejection),
            Err(e) => self.transport_rejection(e),
        };
        self.in_flight = false;
        report
    }

    /// Verify the email code. On success the original code send was blocked
    /// pending this verification, so the flow immediately re-requests the
    /// login code and drops back to the normal code step.
    pub async fn verify_email_code(&mut self, code: &str) -> FlowReport {
        if self.in_flight || self.step != AuthStep::Code(CodeEntry::EmailVerification) {
            return FlowReport::Suppressed;
        }
        let Some(attempt) = self.attempt.clone() else {
            return FlowReport::Suppressed;
        };

        self.in_flight = true;
        let request = VerifyEmailCodeRequest {
            phone_number: self.phone.clone(),
            phone_code_hash: attempt.code_hash,
            code: code.to_string(),
        };
        let report = match self.api.verify_email_code(request).await {
            Ok(Outcome::Success(_)) => {
                self.notifier
                    .success("email verified, requesting the login code again");
                self.step = AuthStep::Code(CodeEntry::Normal);
                self.email_pattern = None;
                let phone = self.phone.clone();
                // The original send never went out; redo it now.
                self.dispatch_code_send(phone, false).await;
                FlowReport::Progressed
            }
            Ok(Outcome::Rejected(rejection)) => self.reject(rejection),
            Err(e) => self.transport_rejection(e),
        };
        self.in_flight = false;
        report
    }

    /// `Code::Normal -> Password::Enter | Success`, branching on the 2FA flag.
    pub async fn verify_code(&mut self, code: &str) -> FlowReport {
        if self.in_flight || self.step != AuthStep::Code(CodeEntry::Normal) {
            return FlowReport::Suppressed;
        }
        let Some(attempt) = self.attempt.clone() else {
            return FlowReport::Suppressed;
        };

        self.in_flight = true;
        let request = VerifyCodeRequest {
            phone_number: self.phone.clone(),
            code: code.to_string(),
            phone_code_hash: attempt.code_hash,
        };
        let report = match self.api.verify_code(request).await {
            Ok(Outcome::Success(verification)) => {
                if verification.requires_2fa {
                    self.step = AuthStep::Password(PasswordEntry::Enter);
                    self.notifier
                        .info("two-factor password enabled on this account");
                } else {
                    self.finish_success();
                }
                FlowReport::Progressed
            }
            Ok(Outcome::Rejected(rejection)) => self.reject(rejection),
            Err(e) => self.transport_rejection(e),
        };
        self.in_flight = false;
        report
    }

    /// `Password::Enter -> Success`. A wrong password keeps the step.
    pub async fn verify_password(&mut self, password: &str) -> FlowReport {
        if self.in_flight || self.step != AuthStep::Password(PasswordEntry::Enter) {
            return FlowReport::Suppressed;
        }

        self.in_flight = true;
        let request = VerifyPasswordRequest {
            phone_number: self.phone.clone(),
            password: password.to_string(),
        };
        let report = match self.api.verify_password(request).await {
            Ok(Outcome::Success(_)) => {
                self.finish_success();
                FlowReport::Progressed
            }
            Ok(Outcome::Rejected(rejection)) => self.reject(rejection),
            Err(e) => self.transport_rejection(e),
        };
        self.in_flight = false;
        report
    }

    /// `Password::Enter -> Password::Reset`.
    pub fn forgot_password(&mut self) -> FlowReport {
        if self.step != AuthStep::Password(PasswordEntry::Enter) {
            return FlowReport::Suppressed;
        }
        self.step = AuthStep::Password(PasswordEntry::Reset);
        FlowReport::Progressed
    }

    /// Request the 2FA reset code; stores the masked recovery email.
    pub async fn request_reset_code(&mut self) -> FlowReport {
        if self.in_flight || self.step != AuthStep::Password(PasswordEntry::Reset) {
            return FlowReport::Suppressed;
        }

        self.in_flight = true;
        let report = match self.api.reset_two_factor(&self.phone).await {
            Ok(Outcome::Success(dispatch)) => {
                let masked = dispatch
                    .masked_email
                    .unwrap_or_else(|| "the recovery email".to_string());
                self.notifier
                    .success(&format!("reset code sent to {masked}"));
                self.masked_email = Some(masked);
                FlowReport::Progressed
            }
            Ok(Outcome::Rejected(rejection)) => self.reject(rejection),
            Err(e) => self.transport_rejection(e),
        };
        self.in_flight = false;
        report
    }

    /// Rotate the 2FA password with the emailed reset code, then return to
    /// normal password entry. The flow is *not* re-authenticated here.
    pub async fn change_password(&mut self, code: &str, new_password: &str) -> FlowReport {
        if self.in_flight || self.step != AuthStep::Password(PasswordEntry::Reset) {
            return FlowReport::Suppressed;
        }

        self.in_flight = true;
        let request = ChangeTwoFactorPasswordRequest {
            phone_number: self.phone.clone(),
            code: code.to_string(),
            new_password: new_password.to_string(),
        };
        let report = match self.api.change_two_factor_password(request).await {
            Ok(Outcome::Success(_)) => {
                self.notifier.success("two-factor password changed");
                self.step = AuthStep::Password(PasswordEntry::Enter);
                FlowReport::Progressed
            }
            Ok(Outcome::Rejected(rejection)) => self.reject(rejection),
            Err(e) => self.transport_rejection(e),
        };
        self.in_flight = false;
        report
    }

    /// Step back one level; clears only the state of the step being left.
    pub fn go_back(&mut self) -> FlowReport {
        match self.step {
            AuthStep::Code(_) => {
                self.step = AuthStep::Phone;
                self.attempt = None;
                self.email_pattern = None;
                FlowReport::Progressed
            }
            AuthStep::Password(PasswordEntry::Enter) => {
                self.step = AuthStep::Code(CodeEntry::Normal);
                FlowReport::Progressed
            }
            AuthStep::Password(PasswordEntry::Reset) => {
                self.step = AuthStep::Password(PasswordEntry::Enter);
                FlowReport::Progressed
            }
            AuthStep::Phone | AuthStep::Success => FlowReport::Suppressed,
        }
    }

    /// Abandon the attempt entirely.
    pub fn cancel(&mut self) {
        self.step = AuthStep::Phone;
        self.attempt = None;
        self.email_pattern = None;
        self.masked_email = None;
    }

    // --- internals -------------------------------------------------------

    fn finish_success(&mut self) {
        self.step = AuthStep::Success;
        self.attempt = None;
        self.notifier.success("authorization successful");

        // Best-effort identity-email rotation; a failure here is logged and
        // never reverts the terminal state.
        let api = Arc::clone(&self.api);
        let notifier = Arc::clone(&self.notifier);
        let phone = self.phone.clone();
        self.side_task = Some(tokio::spawn(async move {
            match api.auto_change_login_email(&phone).await {
                Ok(Outcome::Success(rotation)) => {
                    let new_email = rotation.new_email.unwrap_or_else(|| "a new address".into());
                    notifier.success(&format!("login email rotated to {new_email}"));
                }
                Ok(Outcome::Rejected(rejection)) => {
                    tracing::warn!(%phone, "automatic login-email rotation refused: {rejection}");
                }
                Err(e) => {
                    tracing::warn!(%phone, "automatic login-email rotation failed: {e}");
                }
            }
        }));
    }

    fn reject(&self, rejection: Rejection) -> FlowReport {
        self.notifier.error(&rejection.message);
        FlowReport::Rejected(rejection)
    }

    fn transport_rejection(&self, error: ApiError) -> FlowReport {
        let detail = redact_sensitive_detail(&error.to_string());
        let hint = classify_hint(&detail).unwrap_or(ErrorHint::Transport);
        let rejection = Rejection::new(detail, Some(hint));
        self.notifier.error(&rejection.message);
        FlowReport::Rejected(rejection)
    }
}
