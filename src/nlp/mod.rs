//! Entity extraction: free text (or a cleaned transcript) to a typed
//! [`ParsedMessage`]. Extraction never fails; anything it cannot find is left
//! defaulted for the guards downstream to report.
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Currency, Entities, Intent, ParsedMessage, DEFAULT_CUSTOMER_NAME};
use crate::phone;

pub mod lines;
pub mod speech;

static INVOICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\binvoice\b").expect("invoice regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
});
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\s,;]+").expect("token regex"));
static USD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$|\busd\b|\bdollars?\b").expect("usd regex"));

static DUE_TOMORROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdue\s+(?:on\s+|by\s+)?tomorrow\b").expect("due regex"));
static DUE_IN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bdue\s+in\s+(\d{1,3})\s+(days?|weeks?)\b").expect("due regex")
});
static DUE_ISO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bdue\s+(?:on\s+|by\s+)?(\d{4})-(\d{2})-(\d{2})\b").expect("due regex")
});
static DUE_DMY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bdue\s+(?:on\s+|by\s+)?(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b")
        .expect("due regex")
});

/// Words that may sit between the keyword and the customer's name.
const NAME_PREFIXES: &[&str] = &["for", "to", "a", "an", "the", "new", "please", "pls"];

/// `$`, `usd` or `dollar(s)` anywhere means USD; everything else is NGN.
pub fn detect_currency(text: &str) -> Currency {
    if USD_RE.is_match(text) {
        Currency::USD
    } else {
        Currency::NGN
    }
}

/// Replace a byte range with spaces so later passes cannot see it but
/// segment boundaries survive.
fn blank(text: &mut String, start: usize, end: usize) {
    let spaces = " ".repeat(text[start..end].chars().count());
    text.replace_range(start..end, &spaces);
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(23, 59, 59)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Pull a due-date clause out of `text`, blanking it.
pub fn take_due_date(text: &mut String, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(m) = DUE_TOMORROW_RE.find(text) {
        let (s, e) = (m.start(), m.end());
        blank(text, s, e);
        return end_of_day((now + Duration::days(1)).date_naive());
    }
    if let Some(caps) = DUE_IN_RE.captures(text) {
        let whole = caps.get(0)?;
        let n: i64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str().to_ascii_lowercase();
        let days = if unit.starts_with("week") { n * 7 } else { n };
        let (s, e) = (whole.start(), whole.end());
        blank(text, s, e);
        return end_of_day((now + Duration::days(days)).date_naive());
    }
    if let Some(caps) = DUE_ISO_RE.captures(text) {
        let whole = caps.get(0)?;
        let y: i32 = caps.get(1)?.as_str().parse().ok()?;
        let m: u32 = caps.get(2)?.as_str().parse().ok()?;
        let d: u32 = caps.get(3)?.as_str().parse().ok()?;
        let (s, e) = (whole.start(), whole.end());
        blank(text, s, e);
        return NaiveDate::from_ymd_opt(y, m, d).and_then(end_of_day);
    }
    if let Some(caps) = DUE_DMY_RE.captures(text) {
        let whole = caps.get(0)?;
        let d: u32 = caps.get(1)?.as_str().parse().ok()?;
        let m: u32 = caps.get(2)?.as_str().parse().ok()?;
        let y: i32 = match caps.get(3) {
            Some(y) => {
                let y: i32 = y.as_str().parse().ok()?;
                if y < 100 {
                    2000 + y
                } else {
                    y
                }
            }
            None => now.year(),
        };
        let (s, e) = (whole.start(), whole.end());
        blank(text, s, e);
        return NaiveDate::from_ymd_opt(y, m, d).and_then(end_of_day);
    }
    None
}

/// First alphabetic token after the keyword, skipping a few connector words.
/// A number or phone in that position means there is no name.
fn take_customer_name(text: &mut String) -> Option<String> {
    let mut found = None;
    for token in TOKEN_RE.find_iter(text) {
        let word = token
            .as_str()
            .trim_matches(|c: char| matches!(c, ':' | '.' | '-' | '!' | '(' | ')'));
        if word.is_empty() || NAME_PREFIXES.contains(&word.to_lowercase().as_str()) {
            continue;
        }
        if phone::is_phone_shaped(word) {
            return None;
        }
        let alphabetic = word.chars().count() >= 2
            && word
                .chars()
                .all(|c| c.is_alphabetic() || c == '\'' || c == '-');
        if alphabetic {
            found = Some((word.to_string(), token.start(), token.end()));
        }
        break;
    }
    let (name, start, end) = found?;
    blank(text, start, end);
    Some(name)
}

/// Extract with the current time as the due-date reference.
pub fn extract(text: &str, is_transcript: bool) -> ParsedMessage {
    extract_at(text, is_transcript, Utc::now())
}

pub fn extract_at(text: &str, is_transcript: bool, now: DateTime<Utc>) -> ParsedMessage {
    let cleaned = if is_transcript {
        speech::clean_transcript(text)
    } else {
        text.to_string()
    };

    let Some(keyword) = INVOICE_RE.find(&cleaned) else {
        return ParsedMessage::unknown();
    };

    let currency = detect_currency(&cleaned);
    let mut rest = cleaned[keyword.end()..].to_string();

    let email = EMAIL_RE
        .find(&rest)
        .map(|m| (m.as_str().to_string(), m.start(), m.end()));
    let customer_email = email.map(|(email, s, e)| {
        blank(&mut rest, s, e);
        email
    });

    let customer_phone = phone::extract(&rest).map(|m| {
        blank(&mut rest, m.start, m.end);
        m.normalized
    });

    let due_date = take_due_date(&mut rest, now);
    let name = take_customer_name(&mut rest);
    let lines = lines::parse_lines(&rest, currency);

    let mut confidence: f32 = 0.5;
    if name.is_some() {
        confidence += 0.2;
    }
    if !lines.is_empty() {
        confidence += 0.2;
    }
    if customer_phone.is_some() {
        confidence += 0.1;
    }

    let mut entities = Entities {
        customer_name: name.unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
        customer_phone,
        customer_email,
        currency,
        due_date,
        lines,
        ..Default::default()
    };
    entities.recompute_amount();

    ParsedMessage {
        intent: Intent::CreateInvoice,
        confidence: confidence.min(1.0),
        entities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn full_invoice_with_phone_and_price() {
        let parsed = extract_at("Invoice Joy 08012345678, 12000 wig", false, fixed_now());
        assert_eq!(parsed.intent, Intent::CreateInvoice);
        let e = &parsed.entities;
        assert_eq!(e.currency, Currency::NGN);
        assert_eq!(e.customer_name, "Joy");
        assert_eq!(e.customer_phone.as_deref(), Some("+2348012345678"));
        assert_eq!(e.lines.len(), 1);
        assert_eq!(e.lines[0].description, "wig");
        assert_eq!(e.lines[0].quantity, 1);
        assert_eq!(e.lines[0].unit_price(), Some(d(12000)));
        assert_eq!(e.amount, d(12000));
    }

    #[test]
    fn quantity_only_lines_leave_amount_partial() {
        let parsed = extract_at(
            "Invoice Tonye 08078557662, 5 wig, 10 shoe",
            false,
            fixed_now(),
        );
        let e = &parsed.entities;
        assert_eq!(e.customer_name, "Tonye");
        assert_eq!(e.lines.len(), 2);
        assert!(e.lines.iter().all(|l| !l.is_priced()));
        assert_eq!(e.lines[0].quantity, 5);
        assert_eq!(e.lines[1].quantity, 10);
        assert_eq!(e.amount, Decimal::ZERO);
        assert!(!e.is_fully_priced());
    }

    #[test]
    fn oversized_numbers_do_not_panic() {
        let parsed = extract_at(
            "Invoice Joy, 2 wig 79228162514264337593543950335",
            false,
            fixed_now(),
        );
        assert_eq!(parsed.intent, Intent::CreateInvoice);
        assert_eq!(parsed.entities.amount, Decimal::ZERO);
        assert!(!parsed.entities.is_fully_priced());

        let parsed = extract_at(
            "Invoice Joy, 99999999999999999999999999k wig",
            false,
            fixed_now(),
        );
        assert_eq!(parsed.entities.amount, Decimal::ZERO);
        assert!(!parsed.entities.is_fully_priced());
    }

    #[test]
    fn no_keyword_means_unknown() {
        let parsed = extract_at("$50 sticker", false, fixed_now());
        assert_eq!(parsed.intent, Intent::Unknown);
        assert!(parsed.confidence < 0.5);
        assert!(parsed.entities.lines.is_empty());
    }

    #[test]
    fn usd_markers_switch_threshold() {
        for text in [
            "invoice Sam, $5 sticker",
            "Invoice Sam usd, 5 sticker",
            "Invoice Sam, 5 sticker dollars",
        ] {
            let parsed = extract_at(text, false, fixed_now());
            assert_eq!(parsed.entities.currency, Currency::USD, "{text}");
            assert_eq!(parsed.entities.lines[0].unit_price(), Some(d(5)), "{text}");
        }
    }

    #[test]
    fn missing_name_falls_back_to_sentinel() {
        let parsed = extract_at("Invoice 08012345678, 5000 bag", false, fixed_now());
        assert_eq!(parsed.entities.customer_name, DEFAULT_CUSTOMER_NAME);
        assert_eq!(parsed.entities.customer_name(), None);
        assert_eq!(parsed.entities.amount, d(5000));
    }

    #[test]
    fn connector_words_are_skipped_before_name() {
        let parsed = extract_at("invoice for Ada: 2 bags 7,500", false, fixed_now());
        assert_eq!(parsed.entities.customer_name, "Ada");
        assert_eq!(parsed.entities.lines[0].quantity, 2);
        assert_eq!(parsed.entities.amount, d(15000));
    }

    #[test]
    fn email_is_extracted_and_removed() {
        let parsed = extract_at(
            "Invoice Bola bola@shop.ng, 3000 cap",
            false,
            fixed_now(),
        );
        assert_eq!(
            parsed.entities.customer_email.as_deref(),
            Some("bola@shop.ng")
        );
        assert_eq!(parsed.entities.lines.len(), 1);
        assert_eq!(parsed.entities.lines[0].description, "cap");
    }

    #[test]
    fn due_dates_are_parsed_and_removed() {
        let parsed = extract_at(
            "Invoice Joy, 12000 wig, due in 7 days",
            false,
            fixed_now(),
        );
        let due = parsed.entities.due_date.unwrap();
        assert_eq!(due.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 17).unwrap());
        assert_eq!(parsed.entities.lines.len(), 1);

        let parsed = extract_at("Invoice Joy, 12000 wig due 2026-04-01", false, fixed_now());
        assert_eq!(
            parsed.entities.due_date.unwrap().date_naive(),
            NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()
        );
    }

    #[test]
    fn transcript_numbers_are_converted() {
        let parsed = extract_at(
            "um invoice Joy, fifty thousand for wig",
            true,
            fixed_now(),
        );
        assert_eq!(parsed.entities.customer_name, "Joy");
        assert_eq!(parsed.entities.amount, d(50000));
        assert_eq!(parsed.entities.lines[0].description, "wig");
    }

    #[test]
    fn price_digits_are_not_taken_as_phone() {
        let parsed = extract_at("Invoice Joy, ₦1,500,000 generator", false, fixed_now());
        assert_eq!(parsed.entities.customer_phone, None);
        assert_eq!(parsed.entities.amount, d(1_500_000));
    }
}
