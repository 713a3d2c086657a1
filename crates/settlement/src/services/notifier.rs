//! Merchant notification trait and implementations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{AggregateId, MerchantId};
use domain::Money;
use tokio::sync::RwLock;

use crate::error::SettlementError;

/// Trait for telling merchants about new orders.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_merchant_new_order(
        &self,
        merchant_id: MerchantId,
        order_id: AggregateId,
        total: Money,
    ) -> Result<(), SettlementError>;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_merchant_new_order(
        &self,
        merchant_id: MerchantId,
        order_id: AggregateId,
        total: Money,
    ) -> Result<(), SettlementError> {
        tracing::info!(%merchant_id, %order_id, %total, "merchant notified of new order");
        Ok(())
    }
}

/// A notification as received by [`InMemoryNotifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerchantNotification {
    pub merchant_id: MerchantId,
    pub order_id: AggregateId,
    pub total: Money,
}

/// Records notifications in memory, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<RwLock<Vec<MerchantNotification>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following notification fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<MerchantNotification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify_merchant_new_order(
        &self,
        merchant_id: MerchantId,
        order_id: AggregateId,
        total: Money,
    ) -> Result<(), SettlementError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SettlementError::collaborator(
                "notifier",
                "push gateway unavailable",
            ));
        }
        self.sent.write().await.push(MerchantNotification {
            merchant_id,
            order_id,
            total,
        });
        Ok(())
    }
}
