//! Order engine: checkout and status transitions.

use chrono::Utc;
use common::{AggregateId, MerchantId, ProductId};
use domain::{
    Actor, Aggregate, CommandHandler, Credit, DEFAULT_MAX_ATTEMPTS, InventoryService, LineItem,
    LocationSource, Money, Order, OrderService, OrderStatus, PayoutOutcome, PlaceOrder, Product,
    Transaction, TransitionContext, UnitOfWork, VerificationCode, Wallet, WalletEvent,
    WalletOwner, WalletService, Withdrawal, WithdrawalId, retry_on_conflict,
};
use event_store::{EventEnvelope, EventStore};

use crate::error::{ErrorKind, Result, SettlementError};
use crate::request::{
    CheckoutItem, CreateOrderRequest, TransitionOutcome, TransitionRequest, merge_checkout_items,
};
use crate::services::{Collaborators, DeliveryZone, MerchantProfile};

/// Default currency of wallets opened by the engine.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attempts per request before a commit conflict is surfaced.
    pub max_attempts: u32,
    pub currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// Runs checkouts and transitions.
///
/// Every request loads what it needs, decides, and commits the events of all
/// streams it touched (order, products, driver wallet) as one batch guarded
/// by the versions it loaded. A lost race is retried from scratch against
/// the new state.
pub struct OrderEngine<S: EventStore> {
    store: S,
    orders: OrderService<S>,
    products: CommandHandler<S, Product>,
    inventory: InventoryService<S>,
    wallets: WalletService<S>,
    collaborators: Collaborators,
    config: EngineConfig,
}

impl<S: EventStore + Clone> Clone for OrderEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            orders: self.orders.clone(),
            products: self.products.clone(),
            inventory: self.inventory.clone(),
            wallets: self.wallets.clone(),
            collaborators: self.collaborators.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: EventStore + Clone> OrderEngine<S> {
    pub fn new(store: S, collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            orders: OrderService::new(store.clone()),
            products: CommandHandler::new(store.clone()),
            inventory: InventoryService::new(store.clone()).with_max_attempts(config.max_attempts),
            wallets: WalletService::new(store.clone(), config.currency.clone())
                .with_max_attempts(config.max_attempts),
            store,
            collaborators,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn inventory(&self) -> &InventoryService<S> {
        &self.inventory
    }

    pub fn wallets(&self) -> &WalletService<S> {
        &self.wallets
    }
}

// Checkout
impl<S: EventStore + Clone> OrderEngine<S> {
    /// Validates a checkout, then persists the order and reserves its stock
    /// in one batch. The merchant is notified afterwards without waiting.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, zone_id = %request.zone_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order> {
        let items = Self::validate_checkout_shape(&request)?;
        let zone = self.checkout_zone(&request).await?;
        self.check_served_location(&request).await?;

        let order_id = AggregateId::new();
        let items = &items;
        let request = &request;
        let order = retry_on_conflict(self.config.max_attempts, move |_| {
            self.place_once(order_id, request, items)
        })
        .await
        .inspect_err(|error| {
            if error.kind() == ErrorKind::InsufficientStock {
                metrics::counter!("stock_reservation_rejections_total").increment(1);
            }
        })?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            %order_id,
            zone = %zone.id,
            total = %order.prices().map(|p| p.total).unwrap_or_default(),
            "order created"
        );
        self.notify_merchant(&order);
        Ok(order)
    }

    fn validate_checkout_shape(request: &CreateOrderRequest) -> Result<Vec<CheckoutItem>> {
        let items = merge_checkout_items(&request.items);
        if items.is_empty() {
            return Err(SettlementError::validation("order has no items"));
        }
        if let Some(item) = items.iter().find(|i| i.quantity == 0) {
            return Err(SettlementError::validation(format!(
                "quantity for product {} must be positive",
                item.product_id
            )));
        }
        if !request.delivery_info.contact.is_complete() {
            return Err(SettlementError::validation(
                "delivery contact name and phone are required",
            ));
        }
        if !request.delivery_info.destination.is_valid() {
            return Err(SettlementError::validation("delivery coordinates are out of range"));
        }
        Ok(items)
    }

    /// The requested zone, provided it is active and charges the fee the
    /// customer saw.
    async fn checkout_zone(&self, request: &CreateOrderRequest) -> Result<DeliveryZone> {
        let zone = self
            .collaborators
            .zones
            .get_zone(&request.zone_id)
            .await?
            .ok_or_else(|| {
                SettlementError::validation(format!("unknown delivery zone {}", request.zone_id))
            })?;

        if !zone.is_active() {
            return Err(SettlementError::validation(format!(
                "delivery zone {} is not active",
                zone.id
            )));
        }
        if zone.delivery_fee != request.prices.delivery_fee {
            return Err(SettlementError::validation(format!(
                "delivery fee changed from {} to {}",
                request.prices.delivery_fee, zone.delivery_fee
            )));
        }
        Ok(zone)
    }

    /// Manually entered destinations must fall inside a served zone. GPS
    /// fixes are trusted.
    async fn check_served_location(&self, request: &CreateOrderRequest) -> Result<()> {
        if request.delivery_info.location_source != LocationSource::Manual {
            return Ok(());
        }
        let destination = request.delivery_info.destination;
        let served = self.collaborators.zones.served_zones().await?;
        if served.iter().any(|zone| zone.contains(destination)) {
            Ok(())
        } else {
            Err(SettlementError::validation(
                "delivery location is outside the served area",
            ))
        }
    }

    async fn place_once(
        &self,
        order_id: AggregateId,
        request: &CreateOrderRequest,
        items: &[CheckoutItem],
    ) -> Result<Order> {
        let mut products = Vec::with_capacity(items.len());
        for item in items {
            let product = self
                .products
                .load_existing(item.product_id.into())
                .await?
                .ok_or_else(|| domain::DomainError::not_found("Product", item.product_id))?;
            products.push((item, product));
        }

        let merchant = self.single_merchant(&products).await?;
        let lines = products
            .iter()
            .map(|(item, product)| {
                LineItem::new(
                    item.product_id,
                    product.name(),
                    item.quantity,
                    product.unit_price(),
                )
            })
            .collect();

        let order = Order::default();
        let order_events = order.place(PlaceOrder {
            order_id,
            user_id: request.user_id,
            merchant_id: merchant.merchant_id,
            zone_id: request.zone_id.clone(),
            items: lines,
            prices: request.prices,
            delivery_info: request.delivery_info.clone(),
            pickup_location: merchant.location,
            pickup_code: request.pickup_code.as_deref().map(VerificationCode::new),
            delivery_code: request.delivery_code.as_deref().map(VerificationCode::new),
            payment: request.payment,
            placed_at: Utc::now(),
        })?;

        let mut uow = UnitOfWork::new();
        uow.stage(order_id, &order, &order_events)?;
        for (item, product) in &products {
            let events = product.reserve(order_id, item.quantity)?;
            uow.stage_with_snapshot(item.product_id.into(), product, &events)?;
        }
        let versions = uow.commit(&self.store).await?;

        let mut placed = order;
        placed.apply_events(order_events);
        if let Some(version) = versions.first() {
            placed.set_version(*version);
        }
        Ok(placed)
    }

    /// All products must belong to one merchant known to the directory.
    async fn single_merchant(&self, products: &[(&CheckoutItem, Product)]) -> Result<MerchantProfile> {
        let mut merchants = products.iter().filter_map(|(_, p)| p.merchant_id());
        let merchant_id: MerchantId = merchants
            .next()
            .ok_or_else(|| SettlementError::validation("products have no merchant"))?;
        if merchants.any(|m| m != merchant_id) {
            return Err(SettlementError::validation(
                "all items must come from the same merchant",
            ));
        }

        self.collaborators
            .merchants
            .get_merchant(merchant_id)
            .await?
            .ok_or_else(|| SettlementError::MerchantNotFound(merchant_id.to_string()))
    }

    fn notify_merchant(&self, order: &Order) {
        let (Some(order_id), Some(merchant_id)) = (order.id(), order.merchant_id()) else {
            return;
        };
        let total = order.prices().map(|p| p.total).unwrap_or_default();
        let notifier = self.collaborators.notifier.clone();

        tokio::spawn(async move {
            if let Err(error) = notifier
                .notify_merchant_new_order(merchant_id, order_id, total)
                .await
            {
                metrics::counter!("notification_failures_total").increment(1);
                tracing::warn!(%order_id, %merchant_id, %error, "merchant notification failed");
            }
        });
    }
}

// Transitions
impl<S: EventStore + Clone> OrderEngine<S> {
    /// Moves an order to `request.target` and applies the side effects of
    /// that step in the same batch: stock release on merchant rejection or
    /// cancellation, and the driver's earnings on completion.
    ///
    /// Concurrent requests on one order race on its version. The loser is
    /// retried, sees the new status and fails with an invalid transition, so
    /// earnings are credited at most once.
    #[tracing::instrument(skip(self, request), fields(actor = %request.actor, target = %request.target))]
    pub async fn transition_order(
        &self,
        order_id: AggregateId,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome> {
        let request = &request;
        let outcome = retry_on_conflict(self.config.max_attempts, move |attempt| {
            self.transition_once(order_id, request, attempt)
        })
        .await?;

        let status = outcome.order.status();
        metrics::counter!("order_transitions_total", "status" => status.as_str()).increment(1);
        if let Some(earnings) = &outcome.earnings {
            metrics::counter!("driver_earnings_cents_total")
                .increment(earnings.amount.cents().max(0) as u64);
        }
        tracing::info!(%order_id, %status, earnings = outcome.earnings.is_some(), "order transitioned");
        Ok(outcome)
    }

    async fn transition_once(
        &self,
        order_id: AggregateId,
        request: &TransitionRequest,
        attempt: u32,
    ) -> Result<TransitionOutcome> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))?;

        let target = request.target;
        let mut ctx = TransitionContext {
            pickup_code: request.pickup_code.clone(),
            delivery_code: request.delivery_code.clone(),
            location: request.location,
            ..TransitionContext::default()
        };
        order.check_step(&request.actor, target)?;

        if target == OrderStatus::AcceptedByDriver
            && let Actor::Driver(driver_id) = request.actor
            && !self.collaborators.drivers.is_approved(driver_id).await?
        {
            return Err(SettlementError::DriverNotApproved { driver_id });
        }
        order.check_transition(&request.actor, target, &ctx)?;

        for (from, to) in order.legs_for(target, request.location) {
            ctx.legs.push(self.collaborators.router.resolve(from, to).await);
        }

        let order_events = order.transition(request.actor, target, ctx)?;
        let mut uow = UnitOfWork::new();
        uow.stage(order_id, &order, &order_events)?;

        if target.releases_stock() {
            self.stage_stock_release(&mut uow, &order).await?;
        }
        let earnings = if target == OrderStatus::Completed {
            self.stage_earnings(&mut uow, &order).await?
        } else {
            None
        };

        tracing::debug!(%order_id, attempt, streams = uow.stream_count(), "committing transition");
        let versions = uow.commit(&self.store).await?;

        let mut updated = order;
        updated.apply_events(order_events);
        if let Some(version) = versions.first() {
            updated.set_version(*version);
        }
        Ok(TransitionOutcome {
            order: updated,
            earnings,
        })
    }

    async fn stage_stock_release(&self, uow: &mut UnitOfWork, order: &Order) -> Result<()> {
        let Some(order_id) = order.id() else {
            return Ok(());
        };
        for item in order.items() {
            let product_id: AggregateId = item.product_id.into();
            let Some(product) = self.products.load_existing(product_id).await? else {
                tracing::warn!(%order_id, product_id = %item.product_id, "product vanished, nothing to release");
                continue;
            };
            let events = product.release(order_id)?;
            uow.stage_with_snapshot(product_id, &product, &events)?;
        }
        Ok(())
    }

    /// Stages the driver's earnings credit. Returns the ledger entry it will
    /// record, or `None` if the order earns nothing.
    async fn stage_earnings(&self, uow: &mut UnitOfWork, order: &Order) -> Result<Option<Transaction>> {
        let (Some(order_id), Some(driver_id)) = (order.id(), order.driver_id()) else {
            return Ok(None);
        };
        let amount = order.driver_earnings();
        if !amount.is_positive() {
            return Ok(None);
        }

        let owner = WalletOwner::driver(driver_id);
        let wallet: Wallet = self.wallets.handler().load(owner.wallet_id()).await?;
        let credit = Credit::delivery_earnings(order_id, amount);
        let key = credit.idempotency_key.clone();
        let events = wallet.credit(owner, self.wallets.currency(), credit)?;
        uow.stage_with_snapshot(owner.wallet_id(), &wallet, &events)?;

        let recorded = events.iter().find_map(|event| match event {
            WalletEvent::TransactionRecorded(txn) => Some(txn.clone()),
            _ => None,
        });
        Ok(recorded.or_else(|| {
            key.as_deref()
                .and_then(|k| wallet.transaction_for_key(k))
                .cloned()
        }))
    }
}

// Reads and pass-through operations
impl<S: EventStore + Clone> OrderEngine<S> {
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))
    }

    /// Raw stored events of an order, oldest first.
    pub async fn order_history(&self, order_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.orders.history(order_id).await.map_err(|e| match e {
            domain::DomainError::AggregateNotFound { .. } => SettlementError::OrderNotFound(order_id),
            other => other.into(),
        })
    }

    pub async fn register_product(
        &self,
        merchant_id: MerchantId,
        name: String,
        unit_price: Money,
        initial_stock: u32,
    ) -> Result<Product> {
        let result = self
            .inventory
            .register_product(merchant_id, name, unit_price, initial_stock)
            .await?;
        Ok(result.aggregate)
    }

    pub async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        Ok(self.inventory.restock(product_id, quantity).await?.aggregate)
    }

    pub async fn reprice(&self, product_id: ProductId, unit_price: Money) -> Result<Product> {
        Ok(self.inventory.reprice(product_id, unit_price).await?.aggregate)
    }

    pub async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.inventory
            .get_product(product_id)
            .await?
            .ok_or_else(|| domain::DomainError::not_found("Product", product_id).into())
    }

    pub async fn get_wallet(&self, owner: WalletOwner) -> Result<Wallet> {
        self.wallets
            .get_wallet(owner)
            .await?
            .ok_or_else(|| domain::DomainError::not_found("Wallet", owner).into())
    }

    pub async fn request_withdrawal(
        &self,
        owner: WalletOwner,
        amount: Money,
        payout_phone: &str,
    ) -> Result<Withdrawal> {
        Ok(self
            .wallets
            .request_withdrawal(owner, amount, payout_phone)
            .await?)
    }

    pub async fn mark_withdrawal_pending(
        &self,
        owner: WalletOwner,
        withdrawal_id: WithdrawalId,
        payout_reference: &str,
    ) -> Result<Withdrawal> {
        Ok(self
            .wallets
            .mark_withdrawal_pending(owner, withdrawal_id, payout_reference)
            .await?)
    }

    pub async fn settle_withdrawal(
        &self,
        owner: WalletOwner,
        withdrawal_id: WithdrawalId,
        outcome: PayoutOutcome,
    ) -> Result<Withdrawal> {
        Ok(self
            .wallets
            .settle_withdrawal(owner, withdrawal_id, outcome)
            .await?)
    }
}
