//! Invoice allowance check, run before any invoice is assembled.
use anyhow::Result;
use std::sync::Arc;
use tracing::instrument;

use crate::model::{AccountId, QuotaStatus};
use crate::services::QuotaService;

/// Balance at or below which a post-creation warning is sent.
pub const LOW_BALANCE_THRESHOLD: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceLevel {
    Exhausted,
    Low,
    Healthy,
}

impl BalanceLevel {
    pub fn classify(balance: i64) -> Self {
        if balance <= 0 {
            BalanceLevel::Exhausted
        } else if balance <= LOW_BALANCE_THRESHOLD {
            BalanceLevel::Low
        } else {
            BalanceLevel::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCheck {
    pub status: QuotaStatus,
    pub level: BalanceLevel,
}

impl QuotaCheck {
    pub fn can_create(&self) -> bool {
        self.status.can_create && self.level != BalanceLevel::Exhausted
    }

    pub fn warn_low(&self) -> bool {
        self.level == BalanceLevel::Low
    }
}

#[derive(Clone)]
pub struct QuotaGuard {
    quota: Arc<dyn QuotaService>,
}

impl QuotaGuard {
    pub fn new(quota: Arc<dyn QuotaService>) -> Self {
        Self { quota }
    }

    /// Read-through to the quota service; no side effects.
    #[instrument(skip(self))]
    pub async fn check(&self, account: AccountId) -> Result<QuotaCheck> {
        let status = self.quota.check_quota(account).await?;
        let level = BalanceLevel::classify(status.balance);
        Ok(QuotaCheck { status, level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    struct Fixed(i64);

    #[async_trait]
    impl QuotaService for Fixed {
        async fn check_quota(&self, _account: AccountId) -> Result<QuotaStatus> {
            Ok(QuotaStatus {
                can_create: self.0 > 0,
                balance: self.0,
                plan: "starter".into(),
                pack_price: Decimal::from(2000),
                pack_size: 20,
            })
        }
    }

    #[test]
    fn thresholds() {
        assert_eq!(BalanceLevel::classify(0), BalanceLevel::Exhausted);
        assert_eq!(BalanceLevel::classify(1), BalanceLevel::Low);
        assert_eq!(BalanceLevel::classify(5), BalanceLevel::Low);
        assert_eq!(BalanceLevel::classify(6), BalanceLevel::Healthy);
    }

    #[tokio::test]
    async fn zero_balance_blocks() {
        let check = QuotaGuard::new(Arc::new(Fixed(0))).check(1).await.unwrap();
        assert!(!check.can_create());
        let check = QuotaGuard::new(Arc::new(Fixed(3))).check(1).await.unwrap();
        assert!(check.can_create());
        assert!(check.warn_low());
        let check = QuotaGuard::new(Arc::new(Fixed(40))).check(1).await.unwrap();
        assert!(!check.warn_low());
    }
}
