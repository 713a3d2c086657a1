//! Service for catalog maintenance.

use common::{MerchantId, ProductId};
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::retry::{DEFAULT_MAX_ATTEMPTS, retry_on_conflict};
use crate::values::Money;

use super::Product;

/// Registers products and adjusts their stock and price.
///
/// Reservations are not exposed here: they are staged by the settlement
/// engine in the same batch as the order they belong to.
pub struct InventoryService<S: EventStore> {
    handler: CommandHandler<S, Product>,
    max_attempts: u32,
}

impl<S: EventStore> InventoryService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn handler(&self) -> &CommandHandler<S, Product> {
        &self.handler
    }

    #[tracing::instrument(skip(self, name))]
    pub async fn register_product(
        &self,
        merchant_id: MerchantId,
        name: String,
        unit_price: Money,
        initial_stock: u32,
    ) -> Result<CommandResult<Product>, DomainError> {
        let product_id = ProductId::new();
        let result = self
            .handler
            .execute(product_id.into(), |product| {
                product.register(product_id, merchant_id, name, unit_price, initial_stock)
            })
            .await?;
        tracing::info!(%product_id, %merchant_id, initial_stock, "product registered");
        Ok(result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn restock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.require(product_id).await?;
        retry_on_conflict(self.max_attempts, |_| {
            self.handler
                .execute_with_snapshot(product_id.into(), move |product| product.restock(quantity))
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn reprice(
        &self,
        product_id: ProductId,
        new_price: Money,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.require(product_id).await?;
        retry_on_conflict(self.max_attempts, |_| {
            self.handler
                .execute_with_snapshot(product_id.into(), move |product| product.reprice(new_price))
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, DomainError> {
        self.handler.load_existing(product_id.into()).await
    }

    async fn require(&self, product_id: ProductId) -> Result<(), DomainError> {
        match self.get_product(product_id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::not_found("Product", product_id)),
        }
    }
}

impl<S: EventStore + Clone> Clone for InventoryService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            max_attempts: self.max_attempts,
        }
    }
}
