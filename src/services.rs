//! Contracts of the collaborators the conversational core talks to. The
//! SQLite store in [`crate::db`] and the HTTP clients in [`crate::whatsapp`]
//! and [`crate::transcribe`] are the shipped implementations; tests swap in
//! recording fakes.
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::{Account, AccountId, CustomerId, Entities, Invoice, Product, ProductId, QuotaStatus};

/// Domain failures of invoice creation. The core switches on the variant,
/// never on message text.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("invoice balance exhausted")]
    BalanceExhausted,
    #[error("payout details missing")]
    MissingPayoutDetails,
    #[error("invalid invoice: {0}")]
    Validation(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_verified_account_by_phone(
        &self,
        candidates: &BTreeSet<String>,
    ) -> Result<Option<AccountId>>;

    async fn find_unverified_account_by_phone(
        &self,
        candidates: &BTreeSet<String>,
    ) -> Result<Option<Account>>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;
}

#[async_trait]
pub trait QuotaService: Send + Sync {
    async fn check_quota(&self, account: AccountId) -> Result<QuotaStatus>;
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// One page (1-based) of products plus the total product count.
    async fn list_products(
        &self,
        account: AccountId,
        page: u32,
        page_size: u32,
        search: Option<&str>,
    ) -> Result<(Vec<Product>, u64)>;

    async fn get_product(&self, account: AccountId, product_id: ProductId) -> Result<Option<Product>>;
}

#[async_trait]
pub trait InvoiceService: Send + Sync {
    async fn create_invoice(
        &self,
        issuer: AccountId,
        entities: &Entities,
    ) -> std::result::Result<Invoice, InvoiceError>;

    async fn confirm_transfer(&self, invoice_id: &str) -> Result<()>;

    /// Unpaid invoices with `delivery_pending` set whose customer phone is in
    /// `candidates`, newest first.
    async fn pending_delivery_invoices(&self, candidates: &BTreeSet<String>) -> Result<Vec<Invoice>>;

    /// Newest unpaid invoice whose customer phone is in `candidates`.
    async fn latest_unpaid_invoice(&self, candidates: &BTreeSet<String>) -> Result<Option<Invoice>>;

    async fn set_delivery_pending(&self, invoice_id: &str, pending: bool) -> Result<()>;

    async fn mark_customer_opted_in(&self, customer: CustomerId) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMessage {
    pub header: String,
    pub body: String,
    pub button: String,
    pub rows: Vec<ListRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub id: String,
    pub title: String,
}

/// Outbound messaging. Sends are best effort: failures are logged by the
/// implementation and reported as `false`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> bool;

    async fn send_template(&self, to: &str, template: &str, language: &str, params: &[String])
        -> bool;

    async fn send_document(&self, to: &str, link: &str, filename: &str, caption: &str) -> bool;

    async fn send_list(&self, to: &str, list: &ListMessage) -> bool;

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[Button]) -> bool;

    async fn download_media(&self, media_id: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String>;
}
