//! Per-message dispatcher. One call to [`Engine::handle_inbound`] handles one
//! inbound event end to end: identify the sender, advance any active
//! session, or parse a fresh request and run it through pricing, assembly
//! and delivery.
use anyhow::{anyhow, Result};
use chrono::Duration;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use crate::assembly::{AssemblyOutcome, InvoiceAssembler, MIN_INVOICE_AMOUNT};
use crate::catalog::{CatalogPriceResolver, PriceResolution, CATALOG_MATCH_LIMIT};
use crate::issuer::{Issuer, IssuerResolver};
use crate::messages;
use crate::model::{AccountId, InboundContent, InboundMessage, ParsedMessage};
use crate::nlp;
use crate::notify::{self, DeliveryTemplates, Notifier};
use crate::phone;
use crate::quota::QuotaGuard;
use crate::services::{
    AccountDirectory, CatalogService, InvoiceService, QuotaService, Transcriber, Transport,
};
use crate::session::{CartSession, CartStep, Clock, PendingPriceSession, SessionStore, DEFAULT_TTL_SECS};

pub mod cart;
pub mod pending;

pub const CANCEL_COMMAND: &str = "cancel";
pub const HELP_COMMAND: &str = "help";
pub const BROWSE_KEYWORDS: &[&str] = &["catalog", "catalogue", "products", "shop", "menu", "browse"];
const SEARCH_PREFIX: &str = "search ";

/// The external services the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub accounts: Arc<dyn AccountDirectory>,
    pub quota: Arc<dyn QuotaService>,
    pub catalog: Arc<dyn CatalogService>,
    pub invoices: Arc<dyn InvoiceService>,
    pub transport: Arc<dyn Transport>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub session_ttl: Duration,
    pub min_invoice_amount: Decimal,
    pub catalog_match_limit: u32,
    pub templates: DeliveryTemplates,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::seconds(DEFAULT_TTL_SECS),
            min_invoice_amount: Decimal::from(MIN_INVOICE_AMOUNT),
            catalog_match_limit: CATALOG_MATCH_LIMIT,
            templates: DeliveryTemplates::default(),
        }
    }
}

enum Input {
    Text { body: String, transcript: bool },
    Action { id: String },
}

pub struct Engine {
    transport: Arc<dyn Transport>,
    transcriber: Option<Arc<dyn Transcriber>>,
    catalog: Arc<dyn CatalogService>,
    issuers: IssuerResolver,
    prices: CatalogPriceResolver,
    assembler: InvoiceAssembler,
    notifier: Notifier,
    carts: SessionStore<CartSession>,
    pending: SessionStore<PendingPriceSession>,
}

impl Engine {
    pub fn new(services: Collaborators, settings: EngineSettings, clock: Arc<dyn Clock>) -> Self {
        let quota = QuotaGuard::new(services.quota.clone());
        Self {
            issuers: IssuerResolver::new(services.accounts.clone()),
            prices: CatalogPriceResolver::new(services.catalog.clone())
                .with_limit(settings.catalog_match_limit),
            assembler: InvoiceAssembler::new(quota, services.invoices.clone())
                .with_min_amount(settings.min_invoice_amount),
            notifier: Notifier::new(
                services.transport.clone(),
                services.invoices.clone(),
                services.accounts.clone(),
                settings.templates,
            ),
            carts: SessionStore::new(settings.session_ttl, clock.clone()),
            pending: SessionStore::new(settings.session_ttl, clock),
            transport: services.transport,
            transcriber: services.transcriber,
            catalog: services.catalog,
        }
    }

    /// Handle one inbound event. Failures are logged and answered with a
    /// generic retry hint; they never escape to the transport layer.
    #[instrument(skip_all, fields(from = %msg.from, message_id = %msg.message_id))]
    pub async fn handle_inbound(&self, msg: InboundMessage) {
        let sender = msg.from.clone();
        if let Err(err) = self.dispatch(msg).await {
            error!(?err, "failed to handle inbound message");
            self.reply(&sender, &messages::generic_failure()).await;
        }
    }

    async fn dispatch(&self, msg: InboundMessage) -> Result<()> {
        let sender = msg.from.as_str();
        let Some(input) = self.read_input(sender, msg.content).await else {
            return Ok(());
        };
        let key = phone::session_key(sender);

        if let Input::Text { body, .. } = &input {
            if body.trim().eq_ignore_ascii_case(CANCEL_COMMAND) {
                return self.cancel(sender, &key).await;
            }
            if notify::is_payment_keyword(body) && self.notifier.confirm_payment(sender).await?.is_some() {
                return Ok(());
            }
            if let Some(replay) = self.notifier.deliver_pending(sender).await? {
                // Businesses replying as customers still get their own message handled.
                if replay.sender_account.is_none() {
                    return Ok(());
                }
            }
        }

        let account = match self.issuers.identify(sender).await? {
            Issuer::Verified(id) => id,
            Issuer::Unverified(account) => {
                self.reply(sender, &messages::unverified_sender(&account.business_name))
                    .await;
                return Ok(());
            }
            Issuer::Unknown => {
                self.reply(sender, &messages::unknown_sender()).await;
                return Ok(());
            }
        };

        match input {
            Input::Action { id } => self.handle_action(account, sender, &key, &id).await,
            Input::Text { body, transcript } => {
                self.handle_text(account, sender, &key, &body, transcript)
                    .await
            }
        }
    }

    async fn read_input(&self, sender: &str, content: InboundContent) -> Option<Input> {
        match content {
            InboundContent::Text(body) => Some(Input::Text {
                body,
                transcript: false,
            }),
            InboundContent::Audio { media_id } => match self.transcribe(&media_id).await {
                Ok(text) if !text.trim().is_empty() => Some(Input::Text {
                    body: text,
                    transcript: true,
                }),
                Ok(_) => {
                    self.reply(sender, &messages::voice_not_understood()).await;
                    None
                }
                Err(err) => {
                    warn!(?err, "voice note transcription failed");
                    self.reply(sender, &messages::voice_not_understood()).await;
                    None
                }
            },
            InboundContent::Image {
                caption: Some(caption),
                ..
            } if !caption.trim().is_empty() => Some(Input::Text {
                body: caption,
                transcript: false,
            }),
            InboundContent::Image { .. } => {
                self.reply(sender, &messages::image_without_caption()).await;
                None
            }
            InboundContent::Interactive { id, .. } => Some(Input::Action { id }),
            InboundContent::Unsupported(kind) => {
                self.reply(sender, &messages::unsupported(&kind)).await;
                None
            }
        }
    }

    async fn transcribe(&self, media_id: &str) -> Result<String> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| anyhow!("no transcription service configured"))?;
        let audio = self.transport.download_media(media_id).await?;
        transcriber.transcribe(audio).await
    }

    async fn cancel(&self, sender: &str, key: &str) -> Result<()> {
        let cart = self.carts.delete(key).await;
        let pending = self.pending.delete(key).await;
        let text = if cart.is_some() || pending.is_some() {
            messages::cancelled()
        } else {
            messages::nothing_to_cancel()
        };
        self.reply(sender, &text).await;
        Ok(())
    }

    async fn handle_text(
        &self,
        account: AccountId,
        sender: &str,
        key: &str,
        body: &str,
        transcript: bool,
    ) -> Result<()> {
        let parsed = nlp::extract(body, transcript);

        {
            let mut guard = self.pending.lock(key).await;
            if guard.get().is_some() {
                if parsed.is_invoice() {
                    debug!("fresh invoice request replaces pending prices");
                    guard.delete();
                } else {
                    return self.handle_price_reply(sender, &mut guard, body).await;
                }
            }
        }

        {
            let mut guard = self.carts.lock(key).await;
            let step = guard.get().map(|c| c.step);
            if matches!(step, Some(CartStep::AwaitingQuantity | CartStep::AwaitingCustomer))
                && !parsed.is_invoice()
            {
                return self.handle_cart_reply(account, sender, &mut guard, body).await;
            }
        }

        let command = body.trim();
        if BROWSE_KEYWORDS.iter().any(|k| command.eq_ignore_ascii_case(k)) {
            return self.browse(account, sender, key, None, false).await;
        }
        if let Some(query) = search_query(command) {
            return self.browse(account, sender, key, Some(query), false).await;
        }
        if !parsed.is_invoice() || command.eq_ignore_ascii_case(HELP_COMMAND) {
            self.reply(sender, &messages::help()).await;
            return Ok(());
        }
        self.process_parsed(account, sender, key, parsed).await
    }

    async fn process_parsed(
        &self,
        account: AccountId,
        sender: &str,
        key: &str,
        parsed: ParsedMessage,
    ) -> Result<()> {
        let now = self.pending.clock().now();
        match self
            .prices
            .resolve_prices(account, &parsed.entities, now)
            .await?
        {
            PriceResolution::Resolved(entities) => {
                self.finalize(account, sender, ParsedMessage { entities, ..parsed })
                    .await
            }
            PriceResolution::Partial { matched, unmatched } => {
                let found: Vec<String> = matched
                    .iter()
                    .filter(|l| l.product_id.is_some())
                    .map(|l| l.description.clone())
                    .collect();
                self.reply(sender, &messages::partial_catalog_match(&found, &unmatched))
                    .await;
                Ok(())
            }
            PriceResolution::NeedsPrices(session) => {
                let prompt = messages::ask_prices(&session);
                self.pending.set(key, session).await;
                self.reply(sender, &prompt).await;
                Ok(())
            }
        }
    }

    /// Assemble, create, deliver, then report back to the business.
    async fn finalize(&self, account: AccountId, sender: &str, parsed: ParsedMessage) -> Result<()> {
        let assembly = self.assembler.assemble(account, &parsed).await?;
        let entities = &parsed.entities;
        if !assembly.warnings.is_empty() {
            self.reply(sender, &messages::suspicious_amount(entities.amount, entities.currency))
                .await;
        }
        if let Some(text) = assembly.failure_reply(entities, self.assembler.min_amount()) {
            self.reply(sender, &text).await;
            return Ok(());
        }
        let AssemblyOutcome::Created { invoice, quota } = assembly.outcome else {
            return Ok(());
        };

        let customer_phone = invoice
            .customer_phone
            .clone()
            .or_else(|| entities.customer_phone.clone());
        let notified = match customer_phone {
            Some(phone) => match self.notifier.notify_customer(&invoice, &phone).await {
                Ok(delivery) => Some(delivery.notified),
                Err(err) => {
                    warn!(?err, invoice_id = %invoice.id, "customer notification failed");
                    Some(false)
                }
            },
            None => None,
        };
        self.reply(sender, &messages::invoice_created(&invoice, notified))
            .await;

        if quota.warn_low() {
            let mut status = quota.status.clone();
            status.balance = (status.balance - 1).max(0);
            self.reply(sender, &messages::low_balance(&status)).await;
        }
        Ok(())
    }

    async fn reply(&self, to: &str, text: &str) {
        if !self.transport.send_text(to, text).await {
            debug!("reply not accepted by transport");
        }
    }
}

fn search_query(command: &str) -> Option<String> {
    let prefix = command.get(..SEARCH_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(SEARCH_PREFIX) {
        return None;
    }
    let query = command[SEARCH_PREFIX.len()..].trim();
    (!query.is_empty()).then(|| query.to_string())
}
