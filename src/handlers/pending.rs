use anyhow::Result;
use tracing::info;

use super::Engine;
use crate::messages;
use crate::model::{Intent, ParsedMessage};
use crate::session::{parse_price_reply, PendingPriceSession, SessionGuard};

impl Engine {
    /// A reply while prices are outstanding. Unparseable replies re-prompt
    /// and leave the session as it was.
    pub(super) async fn handle_price_reply(
        &self,
        sender: &str,
        guard: &mut SessionGuard<PendingPriceSession>,
        body: &str,
    ) -> Result<()> {
        let Some(session) = guard.get() else {
            return Ok(());
        };
        let Some(prices) = parse_price_reply(body, &session.lines) else {
            let prompt = messages::price_reply_unparseable(session);
            self.reply(sender, &prompt).await;
            return Ok(());
        };

        let account = session.business_account_id;
        let entities = session.apply_prices(&prices);
        guard.delete();
        info!(account, amount = %entities.amount, lines = entities.lines.len(), "prices supplied");

        let parsed = ParsedMessage {
            intent: Intent::CreateInvoice,
            confidence: 1.0,
            entities,
        };
        self.finalize(account, sender, parsed).await
    }
}
