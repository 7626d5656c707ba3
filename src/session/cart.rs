//! Catalog cart: browse, pick a product, give a quantity, repeat, then name
//! the customer and hand the cart to invoice assembly.
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timestamped;
use crate::model::{
    AccountId, Currency, Entities, Intent, LineItem, ParsedMessage, Product, ProductId,
    DEFAULT_CUSTOMER_NAME,
};
use crate::phone;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CartStep {
    Browsing,
    AwaitingQuantity,
    AwaitingCustomer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingProduct {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartItem {
    pub fn total(&self) -> Decimal {
        self.unit_price.saturating_mul(Decimal::from(self.quantity))
    }
}

/// Result of a quantity reply while a product is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityOutcome {
    Added { name: String, quantity: u32, line_quantity: u32 },
    NotAPositiveInteger,
    ExceedsStock { available: i64 },
    NoPendingProduct,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartSession {
    pub business_account_id: AccountId,
    pub items: Vec<CartItem>,
    pub step: CartStep,
    pub pending_product: Option<PendingProduct>,
    pub search_query: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Timestamped for CartSession {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl CartSession {
    pub fn new(account: AccountId, search_query: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            business_account_id: account,
            items: Vec::new(),
            step: CartStep::Browsing,
            pending_product: None,
            search_query,
            created_at: now,
        }
    }

    pub fn total(&self) -> Decimal {
        self.items
            .iter()
            .map(CartItem::total)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn quantity_in_cart(&self, product: ProductId) -> u32 {
        self.items
            .iter()
            .filter(|i| i.product_id == product)
            .map(|i| i.quantity)
            .sum()
    }

    pub fn select_product(&mut self, product: &Product) {
        self.pending_product = Some(PendingProduct {
            id: product.id,
            name: product.name.clone(),
            unit_price: product.unit_price,
        });
        self.step = CartStep::AwaitingQuantity;
    }

    /// Apply a quantity reply. `available` is the product's current stock
    /// when it is tracked. Invalid replies leave the session untouched.
    pub fn apply_quantity(&mut self, reply: &str, available: Option<i64>) -> QuantityOutcome {
        let Some(pending) = self.pending_product.clone() else {
            return QuantityOutcome::NoPendingProduct;
        };
        let quantity = match reply.trim().parse::<u32>() {
            Ok(q) if q >= 1 => q,
            _ => return QuantityOutcome::NotAPositiveInteger,
        };
        if let Some(stock) = available {
            let remaining = stock - i64::from(self.quantity_in_cart(pending.id));
            if i64::from(quantity) > remaining {
                return QuantityOutcome::ExceedsStock {
                    available: remaining.max(0),
                };
            }
        }

        let line_quantity = match self.items.iter_mut().find(|i| i.product_id == pending.id) {
            Some(item) => {
                item.quantity += quantity;
                item.quantity
            }
            None => {
                self.items.push(CartItem {
                    product_id: pending.id,
                    name: pending.name.clone(),
                    unit_price: pending.unit_price,
                    quantity,
                });
                quantity
            }
        };
        self.pending_product = None;
        self.step = CartStep::Browsing;
        QuantityOutcome::Added {
            name: pending.name,
            quantity,
            line_quantity,
        }
    }

    /// Move to `AwaitingCustomer`. Returns `false` for an empty cart.
    pub fn begin_checkout(&mut self) -> bool {
        if self.items.is_empty() {
            return false;
        }
        self.pending_product = None;
        self.step = CartStep::AwaitingCustomer;
        true
    }

    /// Package the cart as extractor-equivalent output, keeping product ids.
    pub fn into_parsed(self, customer: CustomerReply) -> ParsedMessage {
        let lines = self
            .items
            .iter()
            .map(|item| LineItem {
                product_id: Some(item.product_id),
                ..LineItem::priced(item.name.clone(), item.quantity, item.unit_price)
            })
            .collect();
        let mut entities = Entities {
            customer_name: customer
                .name
                .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
            customer_phone: customer.phone,
            currency: Currency::NGN,
            lines,
            ..Default::default()
        };
        entities.recompute_amount();
        ParsedMessage {
            intent: Intent::CreateInvoice,
            confidence: 1.0,
            entities,
        }
    }

    /// Numbered item list with the running total.
    pub fn summary(&self, currency: Currency) -> String {
        let mut out = String::from("🛒 Your cart:\n");
        for (i, item) in self.items.iter().enumerate() {
            out.push_str(&format!(
                "{}. {} x{} = {}\n",
                i + 1,
                item.name,
                item.quantity,
                currency.format(item.total())
            ));
        }
        out.push_str(&format!("Total: {}", currency.format(self.total())));
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerReply {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Customer name is the first digit-free token of two or more characters;
/// the phone comes from the usual phone extraction.
pub fn parse_customer_reply(text: &str) -> CustomerReply {
    let phone = phone::extract(text).map(|m| m.normalized);
    let name = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|t| t.chars().count() >= 2 && !t.chars().any(|c| c.is_ascii_digit()))
        .map(str::to_string);
    CustomerReply { name, phone }
}
