//! Maps an inbound sender to the business account it speaks for.
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::model::{Account, AccountId};
use crate::phone;
use crate::services::AccountDirectory;

/// Who the sender is, from the business-account point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issuer {
    Verified(AccountId),
    /// An account holds this phone but never verified it; it must not act
    /// for the account.
    Unverified(Account),
    Unknown,
}

#[derive(Clone)]
pub struct IssuerResolver {
    accounts: Arc<dyn AccountDirectory>,
}

impl IssuerResolver {
    pub fn new(accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { accounts }
    }

    /// Verified account for `sender`, if any. Unverified phones never resolve.
    #[instrument(skip_all)]
    pub async fn resolve(&self, sender: &str) -> Result<Option<AccountId>> {
        let candidates = phone::candidates(sender);
        if candidates.is_empty() {
            return Ok(None);
        }
        self.accounts.find_verified_account_by_phone(&candidates).await
    }

    /// Like [`resolve`](Self::resolve) but separates "no account" from
    /// "account exists, phone unverified" for guidance messages.
    #[instrument(skip_all)]
    pub async fn identify(&self, sender: &str) -> Result<Issuer> {
        if let Some(id) = self.resolve(sender).await? {
            return Ok(Issuer::Verified(id));
        }
        let candidates = phone::candidates(sender);
        if candidates.is_empty() {
            return Ok(Issuer::Unknown);
        }
        match self.accounts.find_unverified_account_by_phone(&candidates).await? {
            Some(account) => {
                debug!(account_id = account.id, "sender matches an unverified account");
                Ok(Issuer::Unverified(account))
            }
            None => Ok(Issuer::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    struct Directory {
        accounts: Vec<Account>,
    }

    #[async_trait]
    impl AccountDirectory for Directory {
        async fn find_verified_account_by_phone(
            &self,
            candidates: &BTreeSet<String>,
        ) -> Result<Option<AccountId>> {
            Ok(self
                .accounts
                .iter()
                .find(|a| a.phone_verified && candidates.contains(&a.phone))
                .map(|a| a.id))
        }

        async fn find_unverified_account_by_phone(
            &self,
            candidates: &BTreeSet<String>,
        ) -> Result<Option<Account>> {
            Ok(self
                .accounts
                .iter()
                .find(|a| !a.phone_verified && candidates.contains(&a.phone))
                .cloned())
        }

        async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
            Ok(self.accounts.iter().find(|a| a.id == id).cloned())
        }
    }

    fn account(id: AccountId, phone: &str, verified: bool) -> Account {
        Account {
            id,
            business_name: format!("Shop {id}"),
            phone: phone.into(),
            phone_verified: verified,
            payout: None,
        }
    }

    fn resolver(accounts: Vec<Account>) -> IssuerResolver {
        IssuerResolver::new(Arc::new(Directory { accounts }))
    }

    #[tokio::test]
    async fn verified_phone_resolves_across_formats() {
        let r = resolver(vec![account(7, "+2348012345678", true)]);
        assert_eq!(r.resolve("2348012345678").await.unwrap(), Some(7));
        assert_eq!(r.resolve("08012345678").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn unverified_phone_never_resolves() {
        let r = resolver(vec![account(9, "08012345678", false)]);
        assert_eq!(r.resolve("2348012345678").await.unwrap(), None);
        match r.identify("2348012345678").await.unwrap() {
            Issuer::Unverified(a) => assert_eq!(a.id, 9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_sender() {
        let r = resolver(vec![]);
        assert_eq!(r.identify("2348099999999").await.unwrap(), Issuer::Unknown);
        assert_eq!(r.identify("").await.unwrap(), Issuer::Unknown);
    }
}
