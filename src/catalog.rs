//! Fills in unit prices for quantity-only lines from the business catalog.
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::model::{AccountId, Entities, LineItem, Price, Product};
use crate::services::CatalogService;
use crate::session::PendingPriceSession;

/// Products loaded for matching.
pub const CATALOG_MATCH_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum PriceResolution {
    /// Every line priced; `amount` recomputed.
    Resolved(Entities),
    /// Some lines matched. The caller asks for a corrected message; no
    /// session is started.
    Partial {
        matched: Vec<LineItem>,
        unmatched: Vec<String>,
    },
    /// Nothing matched (or no catalog): ask the business for prices.
    NeedsPrices(PendingPriceSession),
}

#[derive(Clone)]
pub struct CatalogPriceResolver {
    catalog: Arc<dyn CatalogService>,
    limit: u32,
}

impl CatalogPriceResolver {
    pub fn new(catalog: Arc<dyn CatalogService>) -> Self {
        Self {
            catalog,
            limit: CATALOG_MATCH_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, CATALOG_MATCH_LIMIT);
        self
    }

    #[instrument(skip(self, entities, now))]
    pub async fn resolve_prices(
        &self,
        account: AccountId,
        entities: &Entities,
        now: DateTime<Utc>,
    ) -> Result<PriceResolution> {
        if !entities.has_unpriced_lines() {
            return Ok(PriceResolution::Resolved(entities.clone()));
        }

        let (products, total) = self
            .catalog
            .list_products(account, 1, self.limit, None)
            .await?;
        debug!(loaded = products.len(), total, "catalog loaded for matching");

        let mut lines = Vec::with_capacity(entities.lines.len());
        let mut unmatched = Vec::new();
        let mut hits = 0usize;
        for line in &entities.lines {
            if line.is_priced() {
                lines.push(line.clone());
                continue;
            }
            match best_match(&line.description, &products) {
                Some(product) => {
                    hits += 1;
                    lines.push(LineItem {
                        price: Price::Priced(product.unit_price),
                        product_id: Some(product.id),
                        ..line.clone()
                    });
                }
                None => unmatched.push(line.description.clone()),
            }
        }

        if hits == 0 {
            if let Some(session) = PendingPriceSession::new(account, entities, now) {
                info!(account, unpriced = unmatched.len(), "no catalog match, asking for prices");
                return Ok(PriceResolution::NeedsPrices(session));
            }
        }
        if !unmatched.is_empty() {
            return Ok(PriceResolution::Partial {
                matched: lines,
                unmatched,
            });
        }

        let mut resolved = entities.clone();
        resolved.lines = lines;
        resolved.recompute_amount();
        Ok(PriceResolution::Resolved(resolved))
    }
}

/// Closest product by name. Case-insensitive; substring containment or a
/// small edit distance counts as a match. Ties go to the shorter distance,
/// then to the earlier product.
pub fn best_match<'a>(description: &str, products: &'a [Product]) -> Option<&'a Product> {
    let wanted = description.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    products
        .iter()
        .enumerate()
        .filter_map(|(idx, p)| {
            let name = p.name.trim().to_lowercase();
            let distance = strsim::levenshtein(&wanted, &name);
            let contained = name.chars().count().min(wanted.chars().count()) >= 3
                && (name.contains(&wanted) || wanted.contains(&name));
            (contained || distance <= tolerance(&wanted)).then_some((distance, idx, p))
        })
        .min_by_key(|(distance, idx, _)| (*distance, *idx))
        .map(|(_, _, p)| p)
}

fn tolerance(word: &str) -> usize {
    match word.chars().count() {
        0..=3 => 0,
        4..=6 => 1,
        _ => 2,
    }
}
