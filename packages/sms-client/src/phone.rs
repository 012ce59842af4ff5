//! Phone number normalization

/// Normalize a Korean mobile number to digits only.
///
/// Accepts hyphenated and international forms and strips everything but
/// digits, rewriting a leading country code 82 to 0. Returns `None` when the
/// result is not a valid Korean mobile number (11-digit 010, or 10-digit
/// 011/016/017/018/019).
pub fn normalize_phone_number(phone: &str) -> Option<String> {
    let mut digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if let Some(rest) = digits.strip_prefix("82") {
        digits = format!("0{}", rest);
    }

    match digits.len() {
        11 if digits.starts_with("010") => Some(digits),
        10 if ["011", "016", "017", "018", "019"]
            .iter()
            .any(|p| digits.starts_with(p)) =>
        {
            Some(digits)
        }
        _ => None,
    }
}

/// Re-insert hyphens for display, e.g. `01012345678` -> `010-1234-5678`
pub fn display_phone_number(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        11 => format!("{}-{}-{}", &digits[..3], &digits[3..7], &digits[7..]),
        10 => format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        _ => phone.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hyphenated() {
        assert_eq!(
            normalize_phone_number("010-1234-5678"),
            Some("01012345678".to_string())
        );
    }

    #[test]
    fn test_normalize_international_prefix() {
        assert_eq!(
            normalize_phone_number("+82-10-1234-5678"),
            Some("01012345678".to_string())
        );
    }

    #[test]
    fn test_normalize_legacy_prefix() {
        assert_eq!(
            normalize_phone_number("011-123-4567"),
            Some("0111234567".to_string())
        );
    }

    #[test]
    fn test_normalize_rejects_invalid() {
        assert_eq!(normalize_phone_number(""), None);
        assert_eq!(normalize_phone_number("12345"), None);
        assert_eq!(normalize_phone_number("02-123-4567"), None);
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(display_phone_number("01012345678"), "010-1234-5678");
        assert_eq!(display_phone_number("0111234567"), "011-123-4567");
    }
}
