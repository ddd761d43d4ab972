//! Kenyan MSISDN normalization.
//!
//! Subscriber numbers arrive from the checkout form in every shape people
//! type them: `0712 345 678`, `+254712345678`, `712-345-678`. Everything is
//! reduced to the canonical 12-digit `254XXXXXXXXX` form before it reaches
//! the gateway.

/// Country calling code every canonical subscriber number starts with.
pub const COUNTRY_CODE: &str = "254";

/// Canonical MSISDN length: `254` plus nine subscriber digits.
pub const MSISDN_LEN: usize = 12;

/// Normalize a free-form phone number towards canonical MSISDN form.
///
/// Strips punctuation and applies the local-format rules in order. The
/// result is not guaranteed valid: callers must check it with
/// [`is_valid_msisdn`] before use.
pub fn normalize_msisdn(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 10 && digits.starts_with('0') {
        return format!("{}{}", COUNTRY_CODE, &digits[1..]);
    }
    if digits.len() == 9 && (digits.starts_with('7') || digits.starts_with('1')) {
        return format!("{}{}", COUNTRY_CODE, digits);
    }
    if digits.len() == 12 && digits.starts_with(COUNTRY_CODE) {
        return digits;
    }
    // 11-digit 254 numbers pass through unchanged; validation rejects them.
    if digits.len() == 11 && digits.starts_with(COUNTRY_CODE) {
        return digits;
    }
    digits
}

/// Whether `msisdn` is a canonical `254`-prefixed 12-digit subscriber number.
pub fn is_valid_msisdn(msisdn: &str) -> bool {
    msisdn.len() == MSISDN_LEN
        && msisdn.starts_with(COUNTRY_CODE)
        && msisdn.bytes().all(|b| b.is_ascii_digit())
}
