//! Final checks on a resolved entity set before the invoice service is called.
use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::messages;
use crate::model::{AccountId, Entities, Invoice, ParsedMessage, QuotaStatus};
use crate::quota::{QuotaCheck, QuotaGuard};
use crate::services::{InvoiceError, InvoiceService};

pub const MIN_INVOICE_AMOUNT: i64 = 100;
const SMALL_MULTI_LINE_AMOUNT: i64 = 500;
const LARGE_AMOUNT: i64 = 5_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardFailure {
    AmountTooLow,
    NameMissing,
}

/// Non-blocking: creation still goes ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountWarning {
    SmallForLineCount,
    VeryLarge,
}

#[derive(Debug)]
pub enum AssemblyOutcome {
    QuotaExhausted(QuotaStatus),
    Rejected(GuardFailure),
    CreateFailed(InvoiceError),
    Created {
        invoice: Invoice,
        quota: QuotaCheck,
    },
}

#[derive(Debug)]
pub struct Assembly {
    pub warnings: Vec<AmountWarning>,
    pub outcome: AssemblyOutcome,
}

#[derive(Clone)]
pub struct InvoiceAssembler {
    quota: QuotaGuard,
    invoices: Arc<dyn InvoiceService>,
    min_amount: Decimal,
}

impl InvoiceAssembler {
    pub fn new(quota: QuotaGuard, invoices: Arc<dyn InvoiceService>) -> Self {
        Self {
            quota,
            invoices,
            min_amount: Decimal::from(MIN_INVOICE_AMOUNT),
        }
    }

    pub fn with_min_amount(mut self, min_amount: Decimal) -> Self {
        self.min_amount = min_amount;
        self
    }

    pub fn min_amount(&self) -> Decimal {
        self.min_amount
    }

    /// Quota first, then guards in order, then creation. Stops at the first
    /// blocking failure.
    #[instrument(skip(self, parsed))]
    pub async fn assemble(&self, issuer: AccountId, parsed: &ParsedMessage) -> Result<Assembly> {
        let quota = self.quota.check(issuer).await?;
        if !quota.can_create() {
            info!(issuer, "quota exhausted, skipping creation");
            return Ok(Assembly {
                warnings: Vec::new(),
                outcome: AssemblyOutcome::QuotaExhausted(quota.status),
            });
        }

        let entities = &parsed.entities;
        if let Some(failure) = check_guards(entities, self.min_amount) {
            return Ok(Assembly {
                warnings: Vec::new(),
                outcome: AssemblyOutcome::Rejected(failure),
            });
        }
        let warnings = amount_warnings(entities);

        let outcome = match self.invoices.create_invoice(issuer, entities).await {
            Ok(invoice) => {
                info!(issuer, invoice_id = %invoice.id, amount = %invoice.amount, "invoice created");
                AssemblyOutcome::Created { invoice, quota }
            }
            Err(err) => {
                warn!(issuer, error = %err, "invoice creation failed");
                AssemblyOutcome::CreateFailed(err)
            }
        };
        Ok(Assembly { warnings, outcome })
    }
}

pub fn check_guards(entities: &Entities, min_amount: Decimal) -> Option<GuardFailure> {
    let amount = entities.amount;
    if !entities.is_fully_priced() || amount <= Decimal::ZERO || amount < min_amount {
        return Some(GuardFailure::AmountTooLow);
    }
    if entities.customer_name().is_none() {
        return Some(GuardFailure::NameMissing);
    }
    None
}

pub fn amount_warnings(entities: &Entities) -> Vec<AmountWarning> {
    let mut out = Vec::new();
    if entities.amount < Decimal::from(SMALL_MULTI_LINE_AMOUNT) && entities.lines.len() >= 2 {
        out.push(AmountWarning::SmallForLineCount);
    }
    if entities.amount > Decimal::from(LARGE_AMOUNT) {
        out.push(AmountWarning::VeryLarge);
    }
    out
}

impl Assembly {
    /// Reply for every outcome except a successful creation, which is
    /// reported after customer delivery.
    pub fn failure_reply(&self, entities: &Entities, min_amount: Decimal) -> Option<String> {
        match &self.outcome {
            AssemblyOutcome::QuotaExhausted(status) => Some(messages::purchase_prompt(status)),
            AssemblyOutcome::Rejected(GuardFailure::AmountTooLow) => {
                Some(messages::amount_too_low(min_amount, entities.currency))
            }
            AssemblyOutcome::Rejected(GuardFailure::NameMissing) => Some(messages::name_missing()),
            AssemblyOutcome::CreateFailed(err) => Some(match err {
                InvoiceError::BalanceExhausted => messages::balance_exhausted(),
                InvoiceError::MissingPayoutDetails => messages::missing_payout_details(),
                InvoiceError::Validation(detail) => messages::validation_failed(detail),
                InvoiceError::Other(_) => messages::generic_failure(),
            }),
            AssemblyOutcome::Created { .. } => None,
        }
    }
}
