//! Outbound delivery of invoices to customers.
//!
//! Free-form messages only reach a customer inside the protocol's session
//! window, and the server cannot see whether that window is open. When a
//! template is configured it is always used: the template opens the window,
//! the document follows, and the invoice is flagged `delivery_pending` until
//! the customer writes back and the document is sent again.
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::messages;
use crate::model::{Account, Invoice};
use crate::phone;
use crate::services::{AccountDirectory, InvoiceService, Transport};

/// Replies a customer sends to say they have paid.
pub const PAYMENT_KEYWORDS: &[&str] = &["paid", "i have paid", "i've paid", "payment made", "done paying"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryTemplates {
    /// Customer name, invoice id, amount, item summary.
    pub invoice: Option<String>,
    /// As `invoice`, plus payout details and payment link.
    pub invoice_with_payment: Option<String>,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Template,
    FreeForm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub channel: Channel,
    pub notified: bool,
    pub document_sent: bool,
}

/// Result of replaying a queued document to a customer who wrote back.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub invoice: Invoice,
    /// The customer is a verified business in their own right.
    pub sender_account: Option<i64>,
}

pub fn is_payment_keyword(text: &str) -> bool {
    let cleaned = text
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase();
    PAYMENT_KEYWORDS.contains(&cleaned.as_str())
}

#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
    invoices: Arc<dyn InvoiceService>,
    accounts: Arc<dyn AccountDirectory>,
    templates: DeliveryTemplates,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn Transport>,
        invoices: Arc<dyn InvoiceService>,
        accounts: Arc<dyn AccountDirectory>,
        templates: DeliveryTemplates,
    ) -> Self {
        Self {
            transport,
            invoices,
            accounts,
            templates,
        }
    }

    #[instrument(skip_all, fields(invoice_id = %invoice.id))]
    pub async fn notify_customer(&self, invoice: &Invoice, customer_phone: &str) -> Result<Delivery> {
        let issuer = self.accounts.get_account(invoice.issuer_id).await?;
        let business = issuer
            .as_ref()
            .map(|a| a.business_name.clone())
            .unwrap_or_else(|| "Your vendor".to_string());
        let payout = issuer.as_ref().and_then(|a| a.payout.as_ref());

        let template = self
            .templates
            .invoice_with_payment
            .as_deref()
            .map(|t| (t, true))
            .or_else(|| self.templates.invoice.as_deref().map(|t| (t, false)));

        let (channel, notified) = match template {
            Some((name, with_payment)) => {
                let params = template_params(invoice, issuer.as_ref(), with_payment);
                let sent = self
                    .transport
                    .send_template(customer_phone, name, &self.templates.language, &params)
                    .await;
                // Flagged either way: a later customer message replays delivery.
                self.invoices.set_delivery_pending(&invoice.id, true).await?;
                if !sent {
                    warn!(template = name, "invoice template not accepted");
                }
                (Channel::Template, sent)
            }
            None => {
                let body = messages::payment_details(invoice, &business, payout);
                (Channel::FreeForm, self.transport.send_text(customer_phone, &body).await)
            }
        };

        let document_sent = self.send_document(customer_phone, invoice).await;
        info!(?channel, notified, document_sent, "customer notified");
        Ok(Delivery {
            channel,
            notified,
            document_sent,
        })
    }

    async fn send_document(&self, to: &str, invoice: &Invoice) -> bool {
        match &invoice.document_url {
            Some(url) => {
                self.transport
                    .send_document(to, url, &invoice.document_filename(), &messages::document_caption(invoice))
                    .await
            }
            None => false,
        }
    }

    /// Any message from a customer with a queued document counts as an
    /// opt-in: the newest pending invoice is delivered and its flag cleared.
    /// Invoices the sender issued to themselves are ignored.
    #[instrument(skip_all)]
    pub async fn deliver_pending(&self, sender: &str) -> Result<Option<Replay>> {
        let candidates = phone::candidates(sender);
        if candidates.is_empty() {
            return Ok(None);
        }
        let pending = self.invoices.pending_delivery_invoices(&candidates).await?;
        if pending.is_empty() {
            return Ok(None);
        }
        let sender_account = self.accounts.find_verified_account_by_phone(&candidates).await?;
        let Some(invoice) = pending
            .into_iter()
            .find(|inv| Some(inv.issuer_id) != sender_account)
        else {
            debug!("only self-issued invoices pending, skipping replay");
            return Ok(None);
        };

        self.invoices.mark_customer_opted_in(invoice.customer_id).await?;
        let mut ack = messages::delivery_ack(&invoice);
        if sender_account.is_some() {
            ack.push_str(&messages::cross_sell());
        }
        self.transport.send_text(sender, &ack).await;

        let delivered = invoice.document_url.is_none() || self.send_document(sender, &invoice).await;
        if delivered {
            self.invoices.set_delivery_pending(&invoice.id, false).await?;
            info!(invoice_id = %invoice.id, "queued invoice delivered");
        } else {
            warn!(invoice_id = %invoice.id, "document replay failed, keeping delivery pending");
        }
        Ok(Some(Replay {
            invoice,
            sender_account,
        }))
    }

    /// Moves the sender's newest unpaid invoice to awaiting confirmation and
    /// tells both sides. `None` when the sender owes nothing.
    #[instrument(skip_all)]
    pub async fn confirm_payment(&self, sender: &str) -> Result<Option<Invoice>> {
        let candidates = phone::candidates(sender);
        if candidates.is_empty() {
            return Ok(None);
        }
        let Some(invoice) = self.invoices.latest_unpaid_invoice(&candidates).await? else {
            return Ok(None);
        };
        self.invoices.confirm_transfer(&invoice.id).await?;
        info!(invoice_id = %invoice.id, "customer reported payment");

        self.transport
            .send_text(sender, &messages::payment_noted(&invoice))
            .await;
        if let Some(issuer) = self.accounts.get_account(invoice.issuer_id).await? {
            let to = phone::normalize(&issuer.phone).unwrap_or(issuer.phone);
            self.transport
                .send_text(&to, &messages::payment_reported_to_business(&invoice))
                .await;
        }
        Ok(Some(invoice))
    }
}

pub fn template_params(invoice: &Invoice, issuer: Option<&Account>, with_payment: bool) -> Vec<String> {
    let mut params = vec![
        invoice.customer_name.clone(),
        invoice.id.clone(),
        invoice.currency.format(invoice.amount),
        crate::model::summarize_lines(&invoice.lines),
    ];
    if with_payment {
        params.push(messages::payout_line(issuer.and_then(|a| a.payout.as_ref())));
        params.push(invoice.payment_link.clone().unwrap_or_else(|| "-".to_string()));
    }
    params
}
