//! The SQLite-backed implementation of the collaborator traits.
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;

use super::repo::{self, Pool};
use crate::model::{Account, AccountId, CustomerId, Entities, Invoice, Product, ProductId, QuotaStatus};
use crate::services::{AccountDirectory, CatalogService, InvoiceError, InvoiceService, QuotaService};

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
    document_base: Option<String>,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            document_base: None,
        }
    }

    /// Base URL invoice documents are served from; without one invoices are
    /// stored with no document link.
    pub fn with_document_base(mut self, base: Option<String>) -> Self {
        self.document_base = base.filter(|b| !b.trim().is_empty());
        self
    }
}

#[async_trait]
impl AccountDirectory for SqliteStore {
    async fn find_verified_account_by_phone(
        &self,
        candidates: &BTreeSet<String>,
    ) -> Result<Option<AccountId>> {
        Ok(repo::find_account_by_phone(&self.pool, candidates, true)
            .await?
            .map(|a| a.id))
    }

    async fn find_unverified_account_by_phone(
        &self,
        candidates: &BTreeSet<String>,
    ) -> Result<Option<Account>> {
        repo::find_account_by_phone(&self.pool, candidates, false).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        repo::get_account(&self.pool, id).await
    }
}

#[async_trait]
impl QuotaService for SqliteStore {
    async fn check_quota(&self, account: AccountId) -> Result<QuotaStatus> {
        repo::quota_status(&self.pool, account).await
    }
}

#[async_trait]
impl CatalogService for SqliteStore {
    async fn list_products(
        &self,
        account: AccountId,
        page: u32,
        page_size: u32,
        search: Option<&str>,
    ) -> Result<(Vec<Product>, u64)> {
        repo::list_products(&self.pool, account, page, page_size, search).await
    }

    async fn get_product(&self, account: AccountId, product_id: ProductId) -> Result<Option<Product>> {
        repo::get_product(&self.pool, account, product_id).await
    }
}

#[async_trait]
impl InvoiceService for SqliteStore {
    async fn create_invoice(
        &self,
        issuer: AccountId,
        entities: &Entities,
    ) -> std::result::Result<Invoice, InvoiceError> {
        repo::create_invoice(
            &self.pool,
            issuer,
            entities,
            self.document_base.as_deref(),
            Utc::now(),
        )
        .await
    }

    async fn confirm_transfer(&self, invoice_id: &str) -> Result<()> {
        repo::confirm_transfer(&self.pool, invoice_id).await
    }

    async fn pending_delivery_invoices(&self, candidates: &BTreeSet<String>) -> Result<Vec<Invoice>> {
        repo::pending_delivery_invoices(&self.pool, candidates).await
    }

    async fn latest_unpaid_invoice(&self, candidates: &BTreeSet<String>) -> Result<Option<Invoice>> {
        repo::latest_unpaid_invoice(&self.pool, candidates).await
    }

    async fn set_delivery_pending(&self, invoice_id: &str, pending: bool) -> Result<()> {
        repo::set_delivery_pending(&self.pool, invoice_id, pending).await
    }

    async fn mark_customer_opted_in(&self, customer: CustomerId) -> Result<()> {
        repo::mark_customer_opted_in(&self.pool, customer).await
    }
}
