//! Merchant directory: where each merchant's orders are picked up.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::MerchantId;
use domain::GeoPoint;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SettlementError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantProfile {
    pub merchant_id: MerchantId,
    pub name: String,
    pub location: GeoPoint,
}

/// Trait for looking up merchants.
#[async_trait]
pub trait MerchantDirectory: Send + Sync {
    async fn get_merchant(
        &self,
        merchant_id: MerchantId,
    ) -> Result<Option<MerchantProfile>, SettlementError>;

    async fn upsert_merchant(&self, profile: MerchantProfile) -> Result<(), SettlementError>;
}

/// In-memory merchant directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMerchantDirectory {
    merchants: Arc<RwLock<HashMap<MerchantId, MerchantProfile>>>,
}

impl InMemoryMerchantDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MerchantDirectory for InMemoryMerchantDirectory {
    async fn get_merchant(
        &self,
        merchant_id: MerchantId,
    ) -> Result<Option<MerchantProfile>, SettlementError> {
        Ok(self.merchants.read().await.get(&merchant_id).cloned())
    }

    async fn upsert_merchant(&self, profile: MerchantProfile) -> Result<(), SettlementError> {
        if !profile.location.is_valid() {
            return Err(SettlementError::validation("merchant location is out of range"));
        }
        self.merchants
            .write()
            .await
            .insert(profile.merchant_id, profile);
        Ok(())
    }
}
