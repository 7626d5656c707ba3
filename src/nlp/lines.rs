//! Line-item segmentation.
//!
//! Each comma/newline segment is tokenised once and then offered to an
//! ordered list of rules; the first rule that produces a line wins. Keeping
//! the rules separate makes the quantity/price threshold auditable on its own.
use crate::model::{Currency, LineItem};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// `12,000` -> `12000`. Applied until stable so `1,000,000` collapses fully.
static THOUSANDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d),(\d{3})\b").expect("thousands regex"));

/// Optional currency prefix, the number, optional `k`, optional `x`/`pcs`.
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\$|₦|n|ngn|usd)?(\d+(?:\.\d+)?)(k)?(x|pcs|pc)?(naira|dollars?)?$")
        .expect("number regex")
});

static LEADING_X_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^x(\d+)$").expect("x regex"));

/// Words that never belong in a description.
const NOISE: &[&str] = &[
    "x", "@", "at", "each", "for", "per", "of", "naira", "ngn", "usd", "dollar", "dollars", "$",
    "₦", "-", "=", ":", "and", "pcs", "pieces", "piece", "units", "unit",
];

pub fn normalize_thousands(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = THOUSANDS_RE.replace_all(&current, "$1$2").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberToken {
    pub value: Decimal,
    pub int_digits: usize,
    /// `$50`, `₦500`, `50naira`: explicitly a money amount.
    pub money_marked: bool,
    /// `2x`, `x2`, `3pcs`: explicitly a count.
    pub quantity_marked: bool,
    /// `12k`
    pub thousands: bool,
}

impl NumberToken {
    fn as_quantity(&self) -> Option<u32> {
        if self.money_marked || self.thousands || self.value.fract() != Decimal::ZERO {
            return None;
        }
        self.value.to_u32().filter(|q| *q >= 1)
    }

    /// Currency-specific price threshold: NGN prices have 3+ digits, USD
    /// prices may be a single digit.
    pub fn is_price(&self, currency: Currency) -> bool {
        if self.quantity_marked || self.value <= Decimal::ZERO {
            return false;
        }
        if self.money_marked || self.thousands {
            return true;
        }
        match currency {
            Currency::NGN => self.int_digits >= 3,
            Currency::USD => self.int_digits >= 1,
        }
    }
}

pub fn parse_number(token: &str) -> Option<NumberToken> {
    let lowered = token.to_lowercase();
    let t = lowered.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '(' | ')' | '!' | '?'));
    let t = t.trim_end_matches('.');
    if let Some(caps) = LEADING_X_RE.captures(t) {
        let digits = caps.get(1)?.as_str();
        return Some(NumberToken {
            value: Decimal::from_str(digits).ok()?,
            int_digits: digits.len(),
            money_marked: false,
            quantity_marked: true,
            thousands: false,
        });
    }
    let caps = NUMBER_RE.captures(t)?;
    let digits = caps.get(2)?.as_str();
    let mut value = Decimal::from_str(digits).ok()?;
    let thousands = caps.get(3).is_some();
    if thousands {
        // Too large to scale: not a number.
        value = value.checked_mul(Decimal::from(1000))?;
    }
    let int_digits = digits.split('.').next().map(str::len).unwrap_or(0);
    Some(NumberToken {
        value,
        int_digits,
        money_marked: caps.get(1).is_some() || caps.get(5).is_some(),
        quantity_marked: caps.get(4).is_some(),
        thousands,
    })
}

/// One tokenised segment.
#[derive(Debug, Clone)]
pub struct Segment {
    pub currency: Currency,
    pub numbers: Vec<NumberToken>,
    pub words: Vec<String>,
}

impl Segment {
    pub fn parse(text: &str, currency: Currency) -> Self {
        let mut numbers = Vec::new();
        let mut words = Vec::new();
        for raw in text.split_whitespace() {
            let token = raw.trim();
            if let Some(n) = parse_number(token) {
                numbers.push(n);
                continue;
            }
            let word = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-');
            if word.is_empty() || NOISE.contains(&word.to_lowercase().as_str()) {
                continue;
            }
            words.push(word.to_string());
        }
        Self {
            currency,
            numbers,
            words,
        }
    }

    pub fn description(&self) -> Option<String> {
        if self.words.is_empty() {
            None
        } else {
            Some(self.words.join(" "))
        }
    }

    fn rightmost_price(&self) -> Option<usize> {
        self.numbers.iter().rposition(|n| n.is_price(self.currency))
    }
}

type Rule = fn(&Segment) -> Option<LineItem>;

/// Evaluated in order; first match wins.
pub const RULES: &[(&str, Rule)] = &[
    ("quantity_and_price", quantity_and_price),
    ("price_only", price_only),
    ("quantity_only", quantity_only),
];

/// `2 wig 5000`, `wig x2 @ 5000`: a count plus a price-eligible number.
pub fn quantity_and_price(seg: &Segment) -> Option<LineItem> {
    if seg.numbers.len() < 2 {
        return None;
    }
    let price_idx = seg.rightmost_price()?;
    let qty = seg
        .numbers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != price_idx)
        .find_map(|(_, n)| n.as_quantity())?;
    let description = seg.description()?;
    Some(LineItem::priced(description, qty, seg.numbers[price_idx].value))
}

/// `12000 wig`, `$5 sticker`: a single price, quantity 1. A segment that is
/// only a price gets a generic description.
pub fn price_only(seg: &Segment) -> Option<LineItem> {
    let price_idx = seg.rightmost_price()?;
    let description = seg.description().unwrap_or_else(|| "Item".to_string());
    Some(LineItem::priced(description, 1, seg.numbers[price_idx].value))
}

/// `5 wig`: a count with no price; resolved later from the catalog or by
/// asking the business.
pub fn quantity_only(seg: &Segment) -> Option<LineItem> {
    let qty = seg.numbers.iter().find_map(NumberToken::as_quantity)?;
    let description = seg.description()?;
    Some(LineItem::quantity_only(description, qty))
}

pub fn parse_segment(text: &str, currency: Currency) -> Option<LineItem> {
    let seg = Segment::parse(text, currency);
    if seg.numbers.is_empty() {
        return None;
    }
    RULES.iter().find_map(|(_, rule)| rule(&seg))
}

/// Split on commas, semicolons and line breaks and parse each piece.
pub fn parse_lines(text: &str, currency: Currency) -> Vec<LineItem> {
    let normalized = normalize_thousands(text);
    normalized
        .split(|c: char| matches!(c, ',' | '\n' | ';'))
        .filter_map(|segment| parse_segment(segment, currency))
        .collect()
}
