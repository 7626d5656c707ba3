//! Insert inputs for the repository.
//!
//! Reads come back as the domain types in `crate::model`; these structs only
//! describe rows to be written.

use rust_decimal::Decimal;

use crate::model::{AccountId, PayoutDetails};

/// A business account to register.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub business_name: String,
    pub phone: String,
    pub phone_verified: bool,
    pub payout: Option<PayoutDetails>,
    pub plan: String,
    pub invoice_balance: i64,
    pub pack_price: Decimal,
    pub pack_size: i64,
}

impl NewAccount {
    pub fn verified(business_name: &str, phone: &str) -> Self {
        Self {
            business_name: business_name.to_string(),
            phone: phone.to_string(),
            phone_verified: true,
            payout: None,
            plan: "starter".to_string(),
            invoice_balance: 20,
            pack_price: Decimal::from(2000),
            pack_size: 20,
        }
    }
}

/// A catalog product to add.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub account_id: AccountId,
    pub name: String,
    pub unit_price: Decimal,
    pub stock: Option<i64>,
}
