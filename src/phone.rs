//! Phone number canonicalisation and extraction.
//!
//! Identity lookups never compare a single normalised form; they compare the
//! whole candidate set produced by [`candidates`], because stored numbers come
//! from many clients that format them differently.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Country code used to expand leading-zero local numbers.
pub const HOME_COUNTRY_CODE: &str = "234";
/// Digits after the country code for a home-country subscriber number.
const HOME_NATIONAL_LEN: usize = 10;

/// A run of 10–15 digits, optionally prefixed with `+`, not glued to other digits.
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\d+])(\+?\d{10,15})(?:\D|$)").expect("phone regex"));

fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// National significant number for a home-country number, if `digits` is one.
fn home_national(digits: &str) -> Option<&str> {
    if let Some(rest) = digits.strip_prefix(HOME_COUNTRY_CODE) {
        if rest.len() == HOME_NATIONAL_LEN {
            return Some(rest);
        }
        // 2340801... is a common typo for 234801...
        if rest.len() == HOME_NATIONAL_LEN + 1 && rest.starts_with('0') {
            return Some(&rest[1..]);
        }
    }
    if let Some(rest) = digits.strip_prefix('0') {
        if rest.len() == HOME_NATIONAL_LEN {
            return Some(rest);
        }
    }
    None
}

/// Expand one raw phone string into every representation it may be stored
/// under. Empty input yields an empty set; anything else yields at least
/// `{raw}`.
pub fn candidates(raw: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return out;
    }
    out.insert(trimmed.to_string());

    let digits = digits_only(trimmed);
    if digits.is_empty() {
        return out;
    }

    match home_national(&digits) {
        Some(national) => {
            out.insert(format!("{}{}", HOME_COUNTRY_CODE, national));
            out.insert(format!("+{}{}", HOME_COUNTRY_CODE, national));
            out.insert(format!("0{}", national));
        }
        None => {
            out.insert(digits.clone());
            out.insert(format!("+{}", digits));
        }
    }
    out
}

/// E.164 form (`+2348012345678`) when the input looks like a phone number.
pub fn normalize(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    if let Some(national) = home_national(&digits) {
        return Some(format!("+{}{}", HOME_COUNTRY_CODE, national));
    }
    if (10..=15).contains(&digits.len()) && !digits.starts_with('0') {
        return Some(format!("+{}", digits));
    }
    None
}

/// Key used for conversational sessions: the E.164 form when parseable so the
/// same human maps to one session, otherwise the trimmed raw sender.
pub fn session_key(raw: &str) -> String {
    normalize(raw).unwrap_or_else(|| raw.trim().to_string())
}

/// Does this token look like a phone number rather than a word or a price?
pub fn is_phone_shaped(token: &str) -> bool {
    let t = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '+');
    let digits = digits_only(t);
    (10..=15).contains(&digits.len())
        && t.chars().all(|c| c.is_ascii_digit() || c == '+' || c == '-')
}

/// A phone number found inside free text, with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneMatch {
    pub raw: String,
    pub normalized: String,
    pub start: usize,
    pub end: usize,
}

/// Find the first phone number in `text`. Digit runs preceded by a currency
/// marker are prices and are skipped.
pub fn extract(text: &str) -> Option<PhoneMatch> {
    for caps in PHONE_RE.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        let before = text[..m.start()].chars().last();
        if matches!(before, Some('$') | Some('₦')) {
            continue;
        }
        if let Some(normalized) = normalize(m.as_str()) {
            return Some(PhoneMatch {
                raw: m.as_str().to_string(),
                normalized,
                start: m.start(),
                end: m.end(),
            });
        }
    }
    None
}
