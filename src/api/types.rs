//! Wire types for the remote account boundary.
//!
//! Every mutating/stateful endpoint answers with a `{success, message?, ...}`
//! envelope. `Envelope<T>` decodes that shape and converts it into
//! `Outcome<T>`: the payload on success, a structured `Rejection` otherwise.
//! The backend historically reports failures through human-readable messages
//! only, so the hint classification (`classify_hint`) lives here, at the
//! boundary. Nothing above this layer looks at message text.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorHint, Rejection};

/// Structured result of a remote operation. Never an `Err`: a rejection is
/// ordinary data the caller is expected to branch on.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The rejection, if any.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Rejected(r) => Some(r),
        }
    }
}

/// Raw `{success, message?, error_hint?, ...payload}` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Structured hint, when the backend provides one. Older deployments
    /// only send `message`, hence the text classification fallback.
    #[serde(default)]
    pub error_hint: Option<ErrorHint>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Envelope<T> {
    pub(crate) fn into_outcome(self) -> Outcome<T> {
        if self.success {
            Outcome::Success(self.data)
        } else {
            let message = self
                .message
                .unwrap_or_else(|| "operation failed".to_string());
            let hint = self.error_hint.or_else(|| classify_hint(&message));
            Outcome::Rejected(Rejection::new(message, hint))
        }
    }
}

/// Map a failure message onto a machine-readable hint.
///
/// Applied to rejected envelopes without a structured hint and to transport
/// error text, so that "the account session dropped" is recognizable no
/// matter which path reported it.
pub fn classify_hint(message: &str) -> Option<ErrorHint> {
    static UNAUTHENTICATED: OnceLock<Regex> = OnceLock::new();
    static RATE_LIMITED: OnceLock<Regex> = OnceLock::new();
    static BAD_CODE: OnceLock<Regex> = OnceLock::new();
    static BAD_PASSWORD: OnceLock<Regex> = OnceLock::new();

    let unauthenticated = UNAUTHENTICATED.get_or_init(|| {
        Regex::new(r"(?i)session (is )?not (found|authorized)").expect("static regex")
    });
    let rate_limited = RATE_LIMITED
        .get_or_init(|| Regex::new(r"(?i)flood|too many requests|rate.?limit").expect("static regex"));
    let bad_code = BAD_CODE.get_or_init(|| {
        Regex::new(r"(?i)code (is )?(invalid|expired|incorrect)|invalid code").expect("static regex")
    });
    let bad_password = BAD_PASSWORD.get_or_init(|| {
        Regex::new(r"(?i)password (is )?(invalid|incorrect|wrong)|wrong password")
            .expect("static regex")
    });

    if unauthenticated.is_match(message) {
        Some(ErrorHint::SessionUnauthenticated)
    } else if rate_limited.is_match(message) {
        Some(ErrorHint::RateLimited)
    } else if bad_code.is_match(message) {
        Some(ErrorHint::InvalidOrExpiredCode)
    } else if bad_password.is_match(message) {
        Some(ErrorHint::WrongPassword)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SendCodeRequest {
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    pub force_sms: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailCodeRequest {
    pub phone_number: String,
    pub phone_code_hash: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyEmailCodeRequest {
    pub phone_number: String,
    pub phone_code_hash: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyCodeRequest {
    pub phone_number: String,
    pub code: String,
    pub phone_code_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyPasswordRequest {
    pub phone_number: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeTwoFactorPasswordRequest {
    pub phone_number: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorEmailRequest {
    pub phone_number: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Transport/proxy state reported before a code send.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionStatus {
    #[serde(default, alias = "proxyConnected")]
    pub proxy_connected: bool,
    #[serde(default, alias = "proxyInfo")]
    pub proxy_info: Option<String>,
}

/// Result of a code-send call. The hash must be echoed back verbatim on
/// every verification call of this attempt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeDispatch {
    #[serde(default, alias = "phoneCodeHash")]
    pub phone_code_hash: String,
    #[serde(default, alias = "sentTo")]
    pub sent_to: Option<String>,
    #[serde(default, alias = "requiresEmailVerification")]
    pub requires_email_verification: bool,
    #[serde(default, alias = "expireSeconds")]
    pub expire_seconds: Option<u32>,
    #[serde(default, alias = "proxyConnected")]
    pub proxy_connected: Option<bool>,
    #[serde(default, alias = "proxyInfo")]
    pub proxy_info: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailDispatch {
    #[serde(default, alias = "emailPattern")]
    pub email_pattern: Option<String>,
}

/// Payload-free acknowledgement. The human-readable outcome text lives on
/// the envelope, not here; the console phrases its own notifications.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeVerification {
    #[serde(default, alias = "requires2FA")]
    pub requires_2fa: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetDispatch {
    #[serde(default, alias = "maskedEmail")]
    pub masked_email: Option<String>,
}

/// Stored account session, as the backing store sees it. The console keeps a
/// read-mostly cached copy; `is_active` is advisory between liveness polls.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub phone_number: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionHistoryEntry {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Option<String>,
}

/// Account profile as shown on a session card.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub photo_base64: Option<String>,
}

impl UserProfile {
    /// Human-readable display name with the same fallbacks the cards use.
    pub fn display_name(&self) -> Option<String> {
        if let Some(username) = &self.username {
            return Some(format!("@{username}"));
        }
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if full.is_empty() {
            None
        } else {
            Some(full.to_string())
        }
    }
}

/// Reference to a computed artifact file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportReceipt {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// True when the backend reused a previously computed artifact.
    #[serde(default)]
    pub existing: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactCard {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub photo_base64: Option<String>,
    #[serde(default)]
    pub is_online: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactsExport {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub existing: bool,
    #[serde(default)]
    pub contacts: Vec<ContactCard>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvatarUpdate {
    #[serde(default)]
    pub existing: bool,
    #[serde(default)]
    pub photo_base64: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalanceEntry {
    #[serde(default)]
    pub coin: String,
    #[serde(default)]
    pub amount: String,
}

impl BalanceEntry {
    /// Parsed amount; bot-scraped balances are not always numeric.
    pub fn amount_decimal(&self) -> Option<Decimal> {
        self.amount.trim().parse().ok()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotBalances {
    #[serde(default)]
    pub balances: Vec<BalanceEntry>,
}

/// Per-bot balance discovery result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalanceReport {
    #[serde(default)]
    pub existing: bool,
    #[serde(default)]
    pub coins_found: Vec<String>,
    #[serde(default, alias = "data")]
    pub accounts: BTreeMap<String, BotBalances>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternScan {
    #[serde(default)]
    pub existing: bool,
    #[serde(default)]
    pub matches: Option<u64>,
    #[serde(default)]
    pub bundles: Option<u64>,
}

/// One chat's worth of search matches in the shallow index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatSummary {
    #[serde(default, alias = "chatId")]
    pub chat_id: i64,
    #[serde(default, alias = "chatName")]
    pub chat_name: String,
    #[serde(default)]
    pub bundles: Vec<BundleSummary>,
}

/// Lightweight pointer into one match; the full window is fetched lazily.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundleSummary {
    #[serde(default, alias = "matchId")]
    pub match_id: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, alias = "textExcerpt")]
    pub text_excerpt: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternIndex {
    #[serde(default)]
    pub index: Vec<ChatSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundleMessage {
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Message window around one match: before / match / after.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchBundle {
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
    #[serde(default, rename = "match")]
    pub matched: Option<BundleMessage>,
    #[serde(default)]
    pub before: Vec<BundleMessage>,
    #[serde(default)]
    pub after: Vec<BundleMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundleEnvelope {
    #[serde(default)]
    pub bundle: Option<MatchBundle>,
}

/// Session summary metrics. Only the fields the console reads are typed;
/// anything else the backend sends rides along in `extra` untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub is_authorized: Option<bool>,
    #[serde(default)]
    pub dialogs_count: Option<u64>,
    #[serde(default)]
    pub contacts_count: Option<u64>,
    #[serde(default)]
    pub unread_count: Option<u64>,
    #[serde(default)]
    pub login_email_set: Option<bool>,
    #[serde(default)]
    pub email_pattern: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginEmailStatus {
    #[serde(default)]
    pub login_email_set: Option<bool>,
    #[serde(default)]
    pub login_email_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportFiles {
    #[serde(default)]
    pub contacts: Option<String>,
    #[serde(default)]
    pub chats: Option<String>,
    #[serde(default)]
    pub saved_messages: Option<String>,
}

/// Last known artifact per export kind, as the remote side remembers them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LastExports {
    #[serde(default)]
    pub files: ExportFiles,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwoFactorStatus {
    #[serde(default)]
    pub has_2fa: Option<bool>,
    #[serde(default)]
    pub email_pattern: Option<String>,
}

/// Tail of a session's operational log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogTail {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mtime: Option<DateTime<Utc>>,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutomationSummary {
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailRotation {
    #[serde(default)]
    pub old_email: Option<String>,
    #[serde(default)]
    pub new_email: Option<String>,
}

/// Downloaded artifact body plus the content type the server labeled it with.
#[derive(Debug, Clone)]
pub struct ArtifactFile {
    pub content: String,
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn envelope_success_yields_payload() {
        let raw = r#"{"success":true,"phoneCodeHash":"abc","sentTo":"+1555***67","expireSeconds":30}"#;
        let env: Envelope<CodeDispatch> = serde_json::from_str(raw).unwrap();
        match env.into_outcome() {
            Outcome::Success(dispatch) => {
                assert_eq!(dispatch.phone_code_hash, "abc");
                assert_eq!(dispatch.sent_to.as_deref(), Some("+1555***67"));
                assert_eq!(dispatch.expire_seconds, Some(30));
                assert!(!dispatch.requires_email_verification);
            }
            Outcome::Rejected(r) => panic!("unexpected rejection: {r}"),
        }
    }

    #[test]
    fn envelope_failure_classifies_unauthenticated() {
        let raw = r#"{"success":false,"message":"Session is not authorized"}"#;
        let env: Envelope<Ack> = serde_json::from_str(raw).unwrap();
        let rejection = match env.into_outcome() {
            Outcome::Rejected(r) => r,
            Outcome::Success(_) => panic!("expected rejection"),
        };
        assert!(rejection.is_unauthenticated());
    }

    #[test]
    fn structured_hint_wins_over_text_classification() {
        let raw = r#"{"success":false,"message":"please slow down","error_hint":"rate_limited"}"#;
        let env: Envelope<Ack> = serde_json::from_str(raw).unwrap();
        let rejection = match env.into_outcome() {
            Outcome::Rejected(r) => r,
            Outcome::Success(_) => panic!("expected rejection"),
        };
        assert_eq!(rejection.hint, Some(ErrorHint::RateLimited));
    }

    #[test]
    fn classify_hint_covers_auth_taxonomy() {
        assert_eq!(
            classify_hint("Session not found for +123"),
            Some(ErrorHint::SessionUnauthenticated)
        );
        assert_eq!(classify_hint("FLOOD_WAIT_30"), Some(ErrorHint::RateLimited));
        assert_eq!(
            classify_hint("The code is expired"),
            Some(ErrorHint::InvalidOrExpiredCode)
        );
        assert_eq!(
            classify_hint("wrong password, try again"),
            Some(ErrorHint::WrongPassword)
        );
        assert_eq!(classify_hint("disk on fire"), None);
    }

    #[test]
    fn pattern_index_accepts_camel_case_wire_names() {
        let raw = r#"{
            "index": [
                {"chatId": 42, "chatName": "deals", "bundles": [
                    {"matchId": "m-1", "date": "2024-03-01T10:00:00Z", "textExcerpt": "wire me"}
                ]}
            ]
        }"#;
        let index: PatternIndex = serde_json::from_str(raw).unwrap();
        assert_eq!(index.index.len(), 1);
        assert_eq!(index.index[0].chat_id, 42);
        assert_eq!(index.index[0].bundles[0].match_id, "m-1");
        assert_eq!(index.index[0].bundles[0].text_excerpt, "wire me");
    }

    #[test]
    fn balance_amounts_parse_when_numeric() {
        let entry = BalanceEntry {
            coin: "TON".into(),
            amount: "12.5".into(),
        };
        assert_eq!(entry.amount_decimal(), Some(Decimal::new(125, 1)));

        let entry = BalanceEntry {
            coin: "BTC".into(),
            amount: "n/a".into(),
        };
        assert_eq!(entry.amount_decimal(), None);
    }

    #[test]
    fn profile_display_name_prefers_username() {
        let profile = UserProfile {
            username: Some("ghost".into()),
            first_name: Some("Anna".into()),
            ..Default::default()
        };
        assert_eq!(profile.display_name().as_deref(), Some("@ghost"));

        let profile = UserProfile {
            first_name: Some("Anna".into()),
            last_name: Some("K".into()),
            ..Default::default()
        };
        assert_eq!(profile.display_name().as_deref(), Some("Anna K"));

        assert_eq!(UserProfile::default().display_name(), None);
    }
}
