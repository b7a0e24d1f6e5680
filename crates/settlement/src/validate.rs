//! Request validation and normalization
//!
//! Everything here runs before any network call. The provider rejects
//! malformed requests with opaque error codes, so the checks mirror its
//! documented constraints and fail with actionable messages instead.

use crate::error::{SettlementError, SettlementResult};

/// Max length of a payment reference accepted by the provider.
pub const MAX_REFERENCE_LEN: usize = 35;

/// Max length of the human-readable message shown in the payer's app.
pub const MAX_MESSAGE_LEN: usize = 50;

const COUNTRY_CODE: &str = "46";

/// Validate a caller-chosen payment reference.
pub fn validate_reference(reference: &str) -> SettlementResult<()> {
    if reference.is_empty() || reference.len() > MAX_REFERENCE_LEN {
        return Err(SettlementError::Validation(format!(
            "reference must be 1-{MAX_REFERENCE_LEN} characters, got {}",
            reference.len()
        )));
    }
    if !reference
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(SettlementError::Validation(format!(
            "reference '{reference}' may only contain letters, digits and hyphens"
        )));
    }
    Ok(())
}

/// Normalize a Swedish mobile number to international format.
///
/// `0707123456` becomes `46707123456`; an already-prefixed `46707123456`
/// passes through unchanged. Anything else is rejected rather than guessed
/// at.
pub fn normalize_phone(raw: &str) -> SettlementResult<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(SettlementError::Validation(format!(
            "phone number '{raw}' contains non-digit characters"
        )));
    }

    if let Some(rest) = digits.strip_prefix('0') {
        // Local format: 0 + 9 digits.
        if rest.len() == 9 {
            return Ok(format!("{COUNTRY_CODE}{rest}"));
        }
        return Err(SettlementError::Validation(format!(
            "phone number '{raw}' has the wrong length for local format"
        )));
    }

    if digits.starts_with(COUNTRY_CODE) && digits.len() == 11 {
        return Ok(digits);
    }

    Err(SettlementError::Validation(format!(
        "phone number '{raw}' is neither local (07...) nor international (46...) format"
    )))
}

/// Validate a payment amount in minor units (öre).
pub fn validate_amount_ore(amount_ore: i64) -> SettlementResult<()> {
    if amount_ore <= 0 {
        return Err(SettlementError::Validation(format!(
            "amount must be positive, got {amount_ore} öre"
        )));
    }
    Ok(())
}

/// Validate the payer-visible message.
pub fn validate_message(message: &str) -> SettlementResult<()> {
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(SettlementError::Validation(format!(
            "message exceeds {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(())
}

/// Format minor units as the provider's fixed-precision decimal string.
pub fn format_amount(amount_ore: i64) -> String {
    format!("{}.{:02}", amount_ore / 100, amount_ore % 100)
}

/// Parse a provider decimal amount into minor units.
pub fn parse_amount(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}
