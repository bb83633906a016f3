//! E.164 phone number normalization.
//!
//! Produces `^\+\d{10,15}$` on success. Kept dependency-free (no `regex`)
//! since the grammar is a fixed-width digit check.

use crate::error::SipError;

/// Normalizes `input` to `+` followed by 10-15 digits. Idempotent:
/// `normalize(normalize(x)?)? == normalize(x)?` for any `x` that
/// normalizes successfully.
pub fn normalize(input: &str) -> Result<String, SipError> {
    let trimmed = input.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return Err(SipError::InvalidPhoneNumber(input.to_string()));
    }
    if digits.len() < 10 || digits.len() > 15 {
        return Err(SipError::InvalidPhoneNumber(input.to_string()));
    }
    // Reject inputs with stray non-digit, non-plus, non-separator characters
    // (letters, etc.) rather than silently discarding them.
    let allowed_extra = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || c == '+' || c == ' ' || c == '-' || c == '(' || c == ')');
    if !allowed_extra {
        return Err(SipError::InvalidPhoneNumber(input.to_string()));
    }

    Ok(format!("+{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plain_digits() {
        assert_eq!(normalize("15551234567").unwrap(), "+15551234567");
    }

    #[test]
    fn normalizes_formatted_number() {
        assert_eq!(normalize("+1 (555) 123-4567").unwrap(), "+15551234567");
    }

    #[test]
    fn is_idempotent() {
        let once = normalize("+1 555 123 4567").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_too_short() {
        assert!(normalize("12345").is_err());
    }

    #[test]
    fn rejects_too_long() {
        assert!(normalize("1234567890123456").is_err());
    }

    #[test]
    fn rejects_letters() {
        assert!(normalize("+1555CALLME").is_err());
    }

    #[test]
    fn always_matches_grammar_on_success() {
        for input in ["15551234567", "+442071838750", "(555) 012-3456789"] {
            if let Ok(normalized) = normalize(input) {
                assert!(normalized.starts_with('+'));
                let digits = &normalized[1..];
                assert!(digits.len() >= 10 && digits.len() <= 15);
                assert!(digits.chars().all(|c| c.is_ascii_digit()));
            }
        }
    }
}
