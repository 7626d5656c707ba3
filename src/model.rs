use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type AccountId = i64;
pub type ProductId = i64;
pub type CustomerId = i64;

/// Name the extractor falls back to when no customer name was found.
/// Validation treats it as missing.
pub const DEFAULT_CUSTOMER_NAME: &str = "Customer";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateInvoice,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Currency {
    #[default]
    NGN,
    USD,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::NGN => "NGN",
            Currency::USD => "USD",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::NGN => "₦",
            Currency::USD => "$",
        }
    }

    pub fn parse_code(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NGN" => Some(Currency::NGN),
            "USD" => Some(Currency::USD),
            _ => None,
        }
    }

    /// Format an amount as `₦12,000` / `$49.99`.
    pub fn format(&self, amount: Decimal) -> String {
        let rounded = amount.round_dp(2).normalize();
        let text = rounded.to_string();
        let (int_part, frac_part) = match text.split_once('.') {
            Some((i, f)) => (i.to_string(), Some(format!("{:0<2}", f))),
            None => (text.clone(), None),
        };
        let (sign, digits) = match int_part.strip_prefix('-') {
            Some(d) => ("-", d.to_string()),
            None => ("", int_part),
        };
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        match frac_part {
            Some(f) => format!("{}{}{}.{}", sign, self.symbol(), grouped, f),
            None => format!("{}{}{}", sign, self.symbol(), grouped),
        }
    }
}

/// Unit price of a line. `Unpriced` marks a quantity-only line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Price {
    Unpriced,
    Priced(Decimal),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub price: Price,
    pub product_id: Option<ProductId>,
}

impl LineItem {
    pub fn priced(description: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity: quantity.max(1),
            price: Price::Priced(unit_price),
            product_id: None,
        }
    }

    pub fn quantity_only(description: impl Into<String>, quantity: u32) -> Self {
        Self {
            description: description.into(),
            quantity: quantity.max(1),
            price: Price::Unpriced,
            product_id: None,
        }
    }

    pub fn unit_price(&self) -> Option<Decimal> {
        match self.price {
            Price::Priced(p) => Some(p),
            Price::Unpriced => None,
        }
    }

    pub fn is_priced(&self) -> bool {
        matches!(self.price, Price::Priced(_))
    }

    /// Line total, or `None` when unpriced or when the product does not fit
    /// a decimal.
    pub fn total(&self) -> Option<Decimal> {
        self.unit_price()?.checked_mul(Decimal::from(self.quantity))
    }
}

/// Everything extracted from one message. `amount` is only trustworthy once
/// every line is priced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entities {
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub currency: Currency,
    pub amount: Decimal,
    pub due_date: Option<DateTime<Utc>>,
    pub lines: Vec<LineItem>,
}

impl Default for Entities {
    fn default() -> Self {
        Self {
            customer_name: DEFAULT_CUSTOMER_NAME.to_string(),
            customer_phone: None,
            customer_email: None,
            currency: Currency::NGN,
            amount: Decimal::ZERO,
            due_date: None,
            lines: Vec::new(),
        }
    }
}

impl Entities {
    /// Customer name, or `None` when only the default sentinel is present.
    pub fn customer_name(&self) -> Option<&str> {
        let name = self.customer_name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(DEFAULT_CUSTOMER_NAME) {
            None
        } else {
            Some(name)
        }
    }

    /// Every line carries a price and a computable total. False for an
    /// empty line list.
    pub fn is_fully_priced(&self) -> bool {
        !self.lines.is_empty()
            && self.lines.iter().all(|l| l.total().is_some())
            && self.priced_total().is_some()
    }

    pub fn has_unpriced_lines(&self) -> bool {
        self.lines.iter().any(|l| !l.is_priced())
    }

    pub fn unpriced_lines(&self) -> impl Iterator<Item = &LineItem> {
        self.lines.iter().filter(|l| !l.is_priced())
    }

    /// Sum of priced line totals; unpriced lines contribute nothing. `None`
    /// on decimal overflow.
    pub fn priced_total(&self) -> Option<Decimal> {
        self.lines
            .iter()
            .filter_map(LineItem::total)
            .try_fold(Decimal::ZERO, |acc, t| acc.checked_add(t))
    }

    /// An overflowing total leaves the amount at zero so the amount guard
    /// answers with guidance.
    pub fn recompute_amount(&mut self) {
        self.amount = self.priced_total().unwrap_or(Decimal::ZERO);
    }

    /// Short `2x wig, 1x shoe` summary used in notifications.
    pub fn item_summary(&self) -> String {
        summarize_lines(&self.lines)
    }
}

pub fn summarize_lines(lines: &[LineItem]) -> String {
    lines
        .iter()
        .map(|l| format!("{}x {}", l.quantity, l.description))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedMessage {
    pub intent: Intent,
    pub confidence: f32,
    pub entities: Entities,
}

impl ParsedMessage {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.1,
            entities: Entities::default(),
        }
    }

    pub fn is_invoice(&self) -> bool {
        self.intent == Intent::CreateInvoice
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub account_id: AccountId,
    pub name: String,
    pub unit_price: Decimal,
    /// `None` when the business does not track stock for this product.
    pub stock: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayoutDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub business_name: String,
    pub phone: String,
    pub phone_verified: bool,
    pub payout: Option<PayoutDetails>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InvoiceStatus {
    Unpaid,
    AwaitingConfirmation,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::AwaitingConfirmation => "awaiting_confirmation",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(InvoiceStatus::Unpaid),
            "awaiting_confirmation" => Some(InvoiceStatus::AwaitingConfirmation),
            "paid" => Some(InvoiceStatus::Paid),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub issuer_id: AccountId,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub currency: Currency,
    pub amount: Decimal,
    pub lines: Vec<LineItem>,
    pub status: InvoiceStatus,
    pub delivery_pending: bool,
    pub document_url: Option<String>,
    pub payment_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn document_filename(&self) -> String {
        format!("invoice-{}.pdf", self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaStatus {
    pub can_create: bool,
    pub balance: i64,
    pub plan: String,
    pub pack_price: Decimal,
    pub pack_size: i64,
}

/// One inbound event after the transport payload has been decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: String,
    pub message_id: String,
    pub profile_name: Option<String>,
    pub content: InboundContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundContent {
    Text(String),
    Audio { media_id: String },
    Image { media_id: String, caption: Option<String> },
    /// Reply to an interactive list row or button.
    Interactive { id: String, title: String },
    Unsupported(String),
}
