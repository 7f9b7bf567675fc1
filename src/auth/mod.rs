//! Credential-verification flow: phone validation, resend cooldown, and the
//! multi-step state machine that turns a phone number into a usable session.

pub mod cooldown;
pub mod flow;
pub mod phone;

pub use cooldown::{DEFAULT_RESEND_SECS, ResendCooldown};
pub use flow::{AuthFlow, AuthStep, CodeEntry, FlowReport, PasswordEntry};
pub use phone::{is_plausible_phone, normalize_phone};
