//! Catalog browsing and the cart conversation.
use anyhow::Result;
use tracing::{debug, info};

use super::Engine;
use crate::messages;
use crate::model::{AccountId, Currency, ProductId};
use crate::services::{Button, ListMessage, ListRow};
use crate::session::cart::parse_customer_reply;
use crate::session::{CartSession, CartStep, QuantityOutcome, SessionGuard};

/// Rows per interactive list; the messaging protocol rejects more.
pub const MAX_LIST_ROWS: u32 = 10;

pub const ACTION_ADD_MORE: &str = "cart:add_more";
pub const ACTION_SEND_INVOICE: &str = "cart:send_invoice";
pub const ACTION_CLEAR: &str = "cart:clear";
const PRODUCT_PREFIX: &str = "product:";

pub fn product_row_id(id: ProductId) -> String {
    format!("{PRODUCT_PREFIX}{id}")
}

pub fn parse_product_row_id(id: &str) -> Option<ProductId> {
    id.strip_prefix(PRODUCT_PREFIX)?.parse().ok()
}

pub fn cart_buttons() -> Vec<Button> {
    vec![
        Button {
            id: ACTION_ADD_MORE.into(),
            title: "Add more".into(),
        },
        Button {
            id: ACTION_SEND_INVOICE.into(),
            title: "Send invoice".into(),
        },
        Button {
            id: ACTION_CLEAR.into(),
            title: "Clear cart".into(),
        },
    ]
}

impl Engine {
    pub(super) async fn handle_action(
        &self,
        account: AccountId,
        sender: &str,
        key: &str,
        id: &str,
    ) -> Result<()> {
        match id {
            ACTION_ADD_MORE => self.browse(account, sender, key, None, true).await,
            ACTION_SEND_INVOICE => self.checkout(account, sender, key).await,
            ACTION_CLEAR => {
                let text = match self.carts.delete(key).await {
                    Some(_) => messages::cart_cleared(),
                    None => messages::no_active_cart(),
                };
                self.reply(sender, &text).await;
                Ok(())
            }
            other => match parse_product_row_id(other) {
                Some(product_id) => self.select_product(account, sender, key, product_id).await,
                None => {
                    debug!(action = other, "unknown interactive reply");
                    self.reply(sender, &messages::help()).await;
                    Ok(())
                }
            },
        }
    }

    /// List up to [`MAX_LIST_ROWS`] products and put the cart into
    /// `browsing`. With `keep_cart` an existing cart of the same account is
    /// carried over; otherwise a fresh cart replaces it.
    pub(super) async fn browse(
        &self,
        account: AccountId,
        sender: &str,
        key: &str,
        search: Option<String>,
        keep_cart: bool,
    ) -> Result<()> {
        let (products, total) = self
            .catalog
            .list_products(account, 1, MAX_LIST_ROWS, search.as_deref())
            .await?;
        if products.is_empty() {
            let text = match &search {
                Some(q) => messages::no_search_results(q),
                None => messages::catalog_empty(),
            };
            self.reply(sender, &text).await;
            return Ok(());
        }

        {
            let mut guard = self.carts.lock(key).await;
            let now = guard.now();
            let reuse = keep_cart
                && guard
                    .get()
                    .is_some_and(|c| c.business_account_id == account);
            if reuse {
                if let Some(cart) = guard.get_mut() {
                    cart.step = CartStep::Browsing;
                    cart.pending_product = None;
                    cart.search_query = search.clone();
                }
            } else {
                guard.set(CartSession::new(account, search.clone(), now));
            }
        }

        let rows = products
            .iter()
            .take(MAX_LIST_ROWS as usize)
            .map(|p| ListRow {
                id: product_row_id(p.id),
                title: p.name.clone(),
                description: Some(messages::product_row_description(p)),
            })
            .collect::<Vec<_>>();
        let list = ListMessage {
            header: "Catalog".into(),
            body: messages::catalog_list_body(rows.len(), total),
            button: "View products".into(),
            rows,
        };
        self.transport.send_list(sender, &list).await;
        Ok(())
    }

    async fn select_product(
        &self,
        account: AccountId,
        sender: &str,
        key: &str,
        product_id: ProductId,
    ) -> Result<()> {
        let Some(product) = self.catalog.get_product(account, product_id).await? else {
            self.reply(sender, &messages::product_unavailable()).await;
            return Ok(());
        };
        if product.stock.is_some_and(|s| s <= 0) {
            self.reply(sender, &messages::out_of_stock(&product.name)).await;
            return Ok(());
        }

        {
            let mut guard = self.carts.lock(key).await;
            let now = guard.now();
            let reuse = guard
                .get()
                .is_some_and(|c| c.business_account_id == account);
            if !reuse {
                guard.set(CartSession::new(account, None, now));
            }
            if let Some(cart) = guard.get_mut() {
                cart.select_product(&product);
            }
        }
        self.reply(sender, &messages::ask_quantity(&product)).await;
        Ok(())
    }

    async fn checkout(&self, account: AccountId, sender: &str, key: &str) -> Result<()> {
        let mut guard = self.carts.lock(key).await;
        let ready = guard.get_mut().is_some_and(|cart| cart.begin_checkout());
        if ready {
            drop(guard);
            self.reply(sender, &messages::ask_customer()).await;
            return Ok(());
        }
        guard.delete();
        drop(guard);
        self.reply(sender, &messages::cart_empty()).await;
        self.browse(account, sender, key, None, false).await
    }

    /// Text reply while the cart waits for a quantity or a customer.
    pub(super) async fn handle_cart_reply(
        &self,
        account: AccountId,
        sender: &str,
        guard: &mut SessionGuard<CartSession>,
        body: &str,
    ) -> Result<()> {
        let Some(step) = guard.get().map(|c| c.step) else {
            return Ok(());
        };
        match step {
            CartStep::AwaitingQuantity => self.apply_quantity(account, sender, guard, body).await,
            CartStep::AwaitingCustomer => {
                let customer = parse_customer_reply(body);
                if customer.name.is_none() {
                    self.reply(sender, &messages::customer_name_needed()).await;
                    return Ok(());
                }
                let Some(cart) = guard.delete() else {
                    return Ok(());
                };
                info!(items = cart.items.len(), total = %cart.total(), "cart handed to assembly");
                let parsed = cart.into_parsed(customer);
                self.finalize(account, sender, parsed).await
            }
            CartStep::Browsing => {
                self.reply(sender, &messages::help()).await;
                Ok(())
            }
        }
    }

    async fn apply_quantity(
        &self,
        account: AccountId,
        sender: &str,
        guard: &mut SessionGuard<CartSession>,
        body: &str,
    ) -> Result<()> {
        let Some(pending) = guard.get().and_then(|c| c.pending_product.clone()) else {
            return Ok(());
        };
        let stock = self
            .catalog
            .get_product(account, pending.id)
            .await?
            .and_then(|p| p.stock);
        let Some(cart) = guard.get_mut() else {
            return Ok(());
        };
        match cart.apply_quantity(body, stock) {
            QuantityOutcome::Added { name, quantity, .. } => {
                let text = format!(
                    "{}\n\n{}",
                    messages::item_added(&name, quantity),
                    cart.summary(Currency::NGN)
                );
                self.transport
                    .send_buttons(sender, &text, &cart_buttons())
                    .await;
            }
            QuantityOutcome::NotAPositiveInteger => {
                self.reply(sender, &messages::invalid_quantity(&pending.name))
                    .await;
            }
            QuantityOutcome::ExceedsStock { available } => {
                self.reply(sender, &messages::exceeds_stock(&pending.name, available))
                    .await;
            }
            QuantityOutcome::NoPendingProduct => {
                self.reply(sender, &messages::help()).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_ids() {
        assert_eq!(product_row_id(42), "product:42");
        assert_eq!(parse_product_row_id("product:42"), Some(42));
        assert_eq!(parse_product_row_id("product:x"), None);
        assert_eq!(parse_product_row_id(ACTION_CLEAR), None);
    }

    #[test]
    fn three_buttons() {
        let ids: Vec<_> = cart_buttons().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![ACTION_ADD_MORE, ACTION_SEND_INVOICE, ACTION_CLEAR]);
    }
}
