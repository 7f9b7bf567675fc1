//! Phone number normalization and validation.
//!
//! Runs before any remote call: the backend never sees a phone string that
//! is not `+` followed by digits.

/// Normalize a raw phone string: strip everything but digits and prepend `+`.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("+{digits}")
}

/// A plausible international number: `+` then 7 to 15 digits.
pub fn is_plausible_phone(phone: &str) -> bool {
    let Some(rest) = phone.strip_prefix('+') else {
        return false;
    };
    (7..=15).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_digit())
}
