//! Phone number normalization helpers.
//!
//! Consent records and inbound webhooks carry E.164 numbers. Carriers are
//! sloppy about formatting, so senders are normalized before contact lookup.

use std::sync::OnceLock;

use regex::Regex;

fn e164_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("valid E.164 regex"))
}

/// Check whether a string is a structurally valid E.164 number.
pub fn is_valid_e164(number: &str) -> bool {
    e164_pattern().is_match(number)
}

/// Normalize a raw phone string into E.164 form.
///
/// Strips separators and converts an international `00` prefix to `+`.
/// Returns `None` when the result is not a valid E.164 number; callers
/// decide whether that is fatal (consent validation) or not (inbound
/// sender matching proceeds without a contact link).
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let candidate = if let Some(rest) = cleaned.strip_prefix("00") {
        format!("+{rest}")
    } else {
        cleaned
    };

    if is_valid_e164(&candidate) {
        Some(candidate)
    } else {
        None
    }
}
