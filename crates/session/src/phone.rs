//! Phone number normalization and validation.
//!
//! The normalized form (`254XXXXXXXXX`, no plus sign) is the canonical
//! identity used everywhere else: user lookup, session key, lock owner.

use thiserror::Error;

/// Errors produced while normalizing a phone number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    /// The input could not be normalized to a valid subscriber number.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),
}

/// Country calling code prepended to bare subscriber numbers.
const COUNTRY_CODE: &str = "254";

/// Length of the subscriber portion after the country code.
const SUBSCRIBER_LEN: usize = 9;

/// Normalize a phone number to `254XXXXXXXXX`.
///
/// Accepted inputs, after stripping whitespace, hyphens and a leading `+`:
/// - `254712345678` (already canonical)
/// - `0712345678` (local format, leading `0` replaced)
/// - `712345678` (bare 9-digit subscriber number)
///
/// The subscriber portion must match a known mobile operator prefix
/// (`7xx` or `1xx` ranges). Normalization is idempotent.
pub fn normalize(raw: &str) -> Result<String, PhoneError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(PhoneError::InvalidPhone(raw.to_string()));
    }

    let subscriber = if let Some(rest) = cleaned.strip_prefix(COUNTRY_CODE) {
        rest.to_string()
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        rest.to_string()
    } else if cleaned.len() == SUBSCRIBER_LEN {
        cleaned.to_string()
    } else {
        return Err(PhoneError::InvalidPhone(raw.to_string()));
    };

    if !valid_subscriber(&subscriber) {
        return Err(PhoneError::InvalidPhone(raw.to_string()));
    }

    Ok(format!("{COUNTRY_CODE}{subscriber}"))
}

/// Check whether a raw input is a valid phone number.
pub fn is_valid(raw: &str) -> bool {
    normalize(raw).is_ok()
}

/// Validate the 9-digit subscriber portion against operator prefixes.
///
/// Kenyan mobile numbers sit in the `7xx` and `1xx` ranges.
fn valid_subscriber(subscriber: &str) -> bool {
    subscriber.len() == SUBSCRIBER_LEN
        && subscriber.chars().all(|c| c.is_ascii_digit())
        && matches!(subscriber.as_bytes()[0], b'7' | b'1')
}

/// Mask a phone number for log output, keeping the last three digits.
pub fn mask(phone: &str) -> String {
    if phone.len() <= 3 {
        return "*".repeat(phone.len());
    }
    let visible = &phone[phone.len() - 3..];
    format!("{}{}", "*".repeat(phone.len() - 3), visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepted_formats() {
        assert_eq!(normalize("254712345678").unwrap(), "254712345678");
        assert_eq!(normalize("+254712345678").unwrap(), "254712345678");
        assert_eq!(normalize("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize("712345678").unwrap(), "254712345678");
        assert_eq!(normalize("0712 345 678").unwrap(), "254712345678");
        assert_eq!(normalize("0712-345-678").unwrap(), "254712345678");
        assert_eq!(normalize("0110345678").unwrap(), "254110345678");
    }

    #[test]
    fn test_normalize_rejects() {
        assert!(normalize("").is_err());
        assert!(normalize("hello").is_err());
        assert!(normalize("2547123").is_err());
        // Wrong operator prefix.
        assert!(normalize("254912345678").is_err());
        // Too many digits.
        assert!(normalize("2547123456789").is_err());
        // Digits mixed with letters.
        assert!(normalize("07123a5678").is_err());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["+254712345678", "0712345678", "712345678"] {
            let once = normalize(raw).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_is_valid_matches_normalize() {
        assert!(is_valid("0712345678"));
        assert!(!is_valid("not-a-phone"));
        // validate(x) iff validate(normalize(x))
        let normalized = normalize("0712345678").unwrap();
        assert!(is_valid(&normalized));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("254712345678"), "*********678");
        assert_eq!(mask("12"), "**");
    }
}
