//! Phone number normalization for outbound recipients.
//!
//! Recipients are canonicalized to the fixed "91" country code with 10-digit
//! local numbers. Inputs with fewer than 10 digits pass through unchanged;
//! the transport rejects them at send time.

/// Country code prepended to 10-digit local numbers.
const COUNTRY_CODE: &str = "91";

/// Normalize a raw phone string to a canonical recipient id.
///
/// Strips all non-digits, then: a 12-digit number already starting with "91"
/// is kept as-is; a 10-digit number gets "91" prepended; anything longer
/// keeps its last 10 digits with "91" prepended; shorter inputs are returned
/// as stripped. Never fails.
pub fn normalize(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 12 && digits.starts_with(COUNTRY_CODE) {
        digits
    } else if digits.len() == 10 {
        format!("{}{}", COUNTRY_CODE, digits)
    } else if digits.len() > 10 {
        format!("{}{}", COUNTRY_CODE, &digits[digits.len() - 10..])
    } else {
        digits
    }
}
