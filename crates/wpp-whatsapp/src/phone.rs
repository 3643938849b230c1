//! Phone number normalization

/// Country code assumed for numbers that do not carry one
pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// Server suffix for individual chats
pub const USER_SERVER: &str = "c.us";

/// Turn a raw contact string into bare digits with a country code
///
/// Whitespace and `(`, `)`, `-`, `+` are removed. Numbers that do not start
/// with [`DEFAULT_COUNTRY_CODE`] get it prepended. The transform is
/// idempotent.
pub fn normalize_phone_number(raw: &str) -> String {
    let digits: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '-' | '+'))
        .collect();

    if digits.is_empty() || digits.starts_with(DEFAULT_COUNTRY_CODE) {
        digits
    } else {
        format!("{}{}", DEFAULT_COUNTRY_CODE, digits)
    }
}

/// Normalize and append the individual-chat server suffix
pub fn format_chat_id(raw: &str) -> String {
    format!("{}@{}", normalize_phone_number(raw), USER_SERVER)
}
