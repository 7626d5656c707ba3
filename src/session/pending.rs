//! Waiting for the business to price quantity-only lines the catalog could
//! not resolve.
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::Timestamped;
use crate::model::{AccountId, Entities, Price};
use crate::nlp::lines::normalize_thousands;

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)(k)?\b").expect("price regex"));
static LEADING_PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:[$₦]|ngn\s*|n)?(\d+(?:\.\d+)?)(k)?\b").expect("leading price regex"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingLine {
    /// Index of the line in the original request.
    pub position: usize,
    pub description: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingPriceSession {
    pub business_account_id: AccountId,
    /// Unpriced lines, never empty.
    pub lines: Vec<PendingLine>,
    /// The request as extracted, priced and unpriced lines in their
    /// original order.
    pub original: Entities,
    pub created_at: DateTime<Utc>,
}

impl Timestamped for PendingPriceSession {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl PendingPriceSession {
    /// `None` when every line already has a price.
    pub fn new(account: AccountId, entities: &Entities, now: DateTime<Utc>) -> Option<Self> {
        let lines: Vec<PendingLine> = entities
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.is_priced())
            .map(|(position, l)| PendingLine {
                position,
                description: l.description.clone(),
                quantity: l.quantity,
            })
            .collect();
        if lines.is_empty() {
            return None;
        }
        Some(Self {
            business_account_id: account,
            lines,
            original: entities.clone(),
            created_at: now,
        })
    }

    /// Price each pending line in place and recompute the amount.
    /// `prices` must hold one entry per pending line.
    pub fn apply_prices(&self, prices: &[Decimal]) -> Entities {
        let mut entities = self.original.clone();
        for (line, price) in self.lines.iter().zip(prices) {
            if let Some(slot) = entities.lines.get_mut(line.position) {
                slot.price = Price::Priced(*price);
            }
        }
        entities.recompute_amount();
        entities
    }

    /// `1. wig x5` style listing used in prompts.
    pub fn item_list(&self) -> String {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, l)| format!("{}. {} x{}", i + 1, l.description, l.quantity))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn to_price(digits: &str, k: bool) -> Option<Decimal> {
    let value = Decimal::from_str(digits).ok()?;
    let value = if k { value.checked_mul(Decimal::from(1000))? } else { value };
    (value > Decimal::ZERO).then_some(value)
}

fn numbers_in(text: &str) -> Vec<Option<Decimal>> {
    PRICE_RE
        .captures_iter(text)
        .map(|c| to_price(&c[1], c.get(2).is_some()))
        .collect()
}

/// Unit prices for `lines` read from a reply, in line order.
///
/// Tried in turn: exactly one number per line (positional); more numbers
/// than lines, matched by finding each description in a comma or newline
/// separated chunk; a single line priced by the reply's leading number.
/// Anything else is unparseable.
pub fn parse_price_reply(reply: &str, lines: &[PendingLine]) -> Option<Vec<Decimal>> {
    if lines.is_empty() {
        return None;
    }
    let text = normalize_thousands(reply);
    let numbers = numbers_in(&text);

    if numbers.len() == lines.len() {
        return numbers.into_iter().collect();
    }

    if numbers.len() > lines.len() {
        if let Some(prices) = match_by_description(&text, lines) {
            return Some(prices);
        }
    }

    if lines.len() == 1 {
        let caps = LEADING_PRICE_RE.captures(&text)?;
        return to_price(&caps[1], caps.get(2).is_some()).map(|p| vec![p]);
    }
    None
}

fn match_by_description(text: &str, lines: &[PendingLine]) -> Option<Vec<Decimal>> {
    let chunks: Vec<String> = text
        .split(|c: char| matches!(c, ',' | '\n' | ';'))
        .map(|c| c.to_lowercase())
        .collect();
    lines
        .iter()
        .map(|line| {
            let needle = line.description.to_lowercase();
            chunks
                .iter()
                .filter(|chunk| chunk.contains(&needle))
                // Quantities ride along in the chunk; the price is the larger.
                .find_map(|chunk| numbers_in(chunk).into_iter().flatten().max())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineItem;
    use chrono::TimeZone;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn pending(items: &[(&str, u32)]) -> Vec<PendingLine> {
        items
            .iter()
            .enumerate()
            .map(|(position, (d, q))| PendingLine {
                position,
                description: d.to_string(),
                quantity: *q,
            })
            .collect()
    }

    #[test]
    fn positional_prices() {
        let lines = pending(&[("wig", 5), ("shoe", 10)]);
        assert_eq!(
            parse_price_reply("5000, 3000", &lines),
            Some(vec![dec(5000), dec(3000)])
        );
        assert_eq!(
            parse_price_reply("1,500\n2k", &lines),
            Some(vec![dec(1500), dec(2000)])
        );
    }

    #[test]
    fn description_matching_when_quantities_repeat() {
        let lines = pending(&[("wig", 5), ("shoe", 10)]);
        assert_eq!(
            parse_price_reply("shoe 10 at 3000, wig 5 at 5000", &lines),
            Some(vec![dec(5000), dec(3000)])
        );
    }

    #[test]
    fn single_line_leading_number() {
        let lines = pending(&[("wig", 5)]);
        assert_eq!(
            parse_price_reply("₦5000 each for the 5", &lines),
            Some(vec![dec(5000)])
        );
    }

    #[test]
    fn unparseable_replies() {
        let lines = pending(&[("wig", 5), ("shoe", 10)]);
        assert_eq!(parse_price_reply("not sure yet", &lines), None);
        assert_eq!(parse_price_reply("5000", &lines), None);
        assert_eq!(parse_price_reply("0, 3000", &lines), None);
    }

    #[test]
    fn apply_keeps_original_entities() {
        let entities = Entities {
            customer_name: "Tonye".into(),
            customer_phone: Some("+2348078557662".into()),
            lines: vec![
                LineItem::quantity_only("wig", 5),
                LineItem::quantity_only("shoe", 10),
            ],
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let session = PendingPriceSession::new(3, &entities, now).unwrap();
        assert_eq!(session.lines.len(), 2);

        let prices = parse_price_reply("5000, 3000", &session.lines).unwrap();
        let resolved = session.apply_prices(&prices);
        assert_eq!(resolved.lines[0].total(), Some(dec(25000)));
        assert_eq!(resolved.lines[1].total(), Some(dec(30000)));
        assert_eq!(resolved.amount, dec(55000));
        assert_eq!(resolved.customer_name(), Some("Tonye"));
        assert_eq!(resolved.customer_phone.as_deref(), Some("+2348078557662"));
    }

    #[test]
    fn unpriced_line_keeps_its_place() {
        let entities = Entities {
            customer_name: "Joy".into(),
            lines: vec![
                LineItem::quantity_only("shoe", 5),
                LineItem::priced("wig", 1, dec(12000)),
            ],
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let session = PendingPriceSession::new(3, &entities, now).unwrap();
        assert_eq!(session.lines.len(), 1);
        assert_eq!(session.lines[0].position, 0);

        let resolved = session.apply_prices(&[dec(3000)]);
        let names: Vec<&str> = resolved.lines.iter().map(|l| l.description.as_str()).collect();
        assert_eq!(names, vec!["shoe", "wig"]);
        assert_eq!(resolved.amount, dec(27000));
    }

    #[test]
    fn no_session_without_unpriced_lines() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        assert!(PendingPriceSession::new(3, &Entities::default(), now).is_none());
        let priced = Entities {
            lines: vec![LineItem::priced("wig", 1, dec(12000))],
            ..Default::default()
        };
        assert!(PendingPriceSession::new(3, &priced, now).is_none());
    }

    #[test]
    fn oversized_price_reply_is_unparseable() {
        let lines = pending(&[("wig", 1)]);
        assert_eq!(parse_price_reply("99999999999999999999999999k", &lines), None);
    }
}
