//! Integration tests for checkout and order transitions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{AggregateId, DriverId, MerchantId, ProductId, UserId};
use domain::{
    Actor, Aggregate, Contact, DeliveryInfo, GeoPoint, LocationSource, Money, Order, OrderPrices,
    OrderStatus, Payment, PaymentMethod, PaymentStatus, PayoutOutcome, RouteLeg, WalletOwner,
    WithdrawalStatus, earnings_key,
};
use event_store::{EventStore, InMemoryEventStore};
use settlement::{
    CheckoutItem, Collaborators, CreateOrderRequest, DeliveryZone, DriverDirectory, EngineConfig,
    ErrorKind, InMemoryDriverDirectory, InMemoryMerchantDirectory, InMemoryNotifier,
    InMemoryZoneDirectory, MerchantDirectory, MerchantProfile, OrderEngine, ResilientRouter,
    RouteResolver, SettlementError, TransitionRequest, ZoneStatus,
};

const PICKUP: &str = "A1B2C3";
const DELIVERY: &str = "D4E5F6";
const FEE: i64 = 500;
const PRICE: i64 = 1_000;

type Engine = OrderEngine<InMemoryEventStore>;

fn merchant_location() -> GeoPoint {
    GeoPoint::new(9.01, 38.76)
}

fn destination() -> GeoPoint {
    GeoPoint::new(9.03, 38.74)
}

fn zone(id: &str, status: ZoneStatus) -> DeliveryZone {
    DeliveryZone {
        id: id.into(),
        name: id.into(),
        status,
        delivery_fee: Money::from_cents(FEE),
        polygon: vec![
            GeoPoint::new(9.0, 38.7),
            GeoPoint::new(9.0, 38.8),
            GeoPoint::new(9.1, 38.8),
            GeoPoint::new(9.1, 38.7),
        ],
    }
}

struct TestHarness {
    engine: Engine,
    store: InMemoryEventStore,
    drivers: InMemoryDriverDirectory,
    notifier: InMemoryNotifier,
    merchant_id: MerchantId,
    driver_id: DriverId,
    product_id: ProductId,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_router(ResilientRouter::straight_line(25.0)).await
    }

    async fn with_router(router: ResilientRouter) -> Self {
        let store = InMemoryEventStore::new();
        let zones = InMemoryZoneDirectory::new([
            zone("bole", ZoneStatus::Active),
            DeliveryZone {
                polygon: vec![
                    GeoPoint::new(8.0, 38.0),
                    GeoPoint::new(8.0, 38.1),
                    GeoPoint::new(8.1, 38.1),
                ],
                ..zone("piassa", ZoneStatus::Inactive)
            },
        ]);
        let drivers = InMemoryDriverDirectory::new();
        let merchants = InMemoryMerchantDirectory::new();
        let notifier = InMemoryNotifier::new();

        let collaborators = Collaborators::new(
            Arc::new(zones),
            Arc::new(drivers.clone()),
            Arc::new(merchants.clone()),
            router,
            Arc::new(notifier.clone()),
        );
        let engine = OrderEngine::new(store.clone(), collaborators, EngineConfig::default());

        let merchant_id = MerchantId::new();
        merchants
            .upsert_merchant(MerchantProfile {
                merchant_id,
                name: "Kategna".into(),
                location: merchant_location(),
            })
            .await
            .unwrap();
        let driver_id = DriverId::new();
        drivers.set_approved(driver_id, true).await.unwrap();

        let product = engine
            .register_product(merchant_id, "Tibs".into(), Money::from_cents(PRICE), 10)
            .await
            .unwrap();

        Self {
            product_id: product.product_id().unwrap(),
            engine,
            store,
            drivers,
            notifier,
            merchant_id,
            driver_id,
        }
    }

    fn checkout(&self, quantity: u32) -> CreateOrderRequest {
        self.checkout_for(self.product_id, quantity, PRICE)
    }

    fn checkout_for(&self, product_id: ProductId, quantity: u32, price: i64) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: UserId::new(),
            zone_id: "bole".into(),
            items: vec![CheckoutItem {
                product_id,
                quantity,
            }],
            delivery_info: DeliveryInfo {
                destination: destination(),
                location_source: LocationSource::Gps,
                contact: Contact {
                    name: "Hana".into(),
                    phone: "+251911000111".into(),
                },
                notes: Some("Gate 2".into()),
                resolved_address: None,
                estimated_delivery_at: Some(Utc::now() + chrono::Duration::hours(1)),
            },
            prices: OrderPrices::new(
                Money::from_cents(price * quantity as i64),
                Money::from_cents(FEE),
                Money::zero(),
            ),
            payment: Some(Payment {
                method: PaymentMethod::Cash,
                status: PaymentStatus::Pending,
            }),
            pickup_code: Some(PICKUP.into()),
            delivery_code: Some(DELIVERY.into()),
        }
    }

    fn merchant(&self) -> Actor {
        Actor::Merchant(self.merchant_id)
    }

    fn driver(&self) -> Actor {
        Actor::Driver(self.driver_id)
    }

    async fn stock(&self) -> u32 {
        self.engine
            .get_product(self.product_id)
            .await
            .unwrap()
            .stock_quantity()
    }

    async fn step(&self, order_id: AggregateId, request: TransitionRequest) -> Order {
        self.engine
            .transition_order(order_id, request)
            .await
            .unwrap()
            .order
    }

    /// Places an order and walks it to READY_TO_DELIVER.
    async fn ready_order(&self) -> AggregateId {
        let order = self.engine.create_order(self.checkout(2)).await.unwrap();
        let order_id = order.id().unwrap();
        for target in [
            OrderStatus::AcceptedByMerchant,
            OrderStatus::InPreparation,
            OrderStatus::ReadyToDeliver,
        ] {
            self.step(order_id, TransitionRequest::new(self.merchant(), target))
                .await;
        }
        order_id
    }

    /// Walks a ready order to ON_THE_WAY with the harness driver.
    async fn order_on_the_way(&self) -> AggregateId {
        let order_id = self.ready_order().await;
        self.step(
            order_id,
            TransitionRequest::new(self.driver(), OrderStatus::AcceptedByDriver)
                .with_pickup_code(PICKUP)
                .with_location(GeoPoint::new(9.02, 38.77)),
        )
        .await;
        self.step(
            order_id,
            TransitionRequest::new(self.driver(), OrderStatus::OnTheWay),
        )
        .await;
        order_id
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn order_is_placed_and_stock_reserved() {
        let h = TestHarness::new().await;

        let order = h.engine.create_order(h.checkout(3)).await.unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.status_history().len(), 1);
        assert_eq!(order.merchant_id(), Some(h.merchant_id));
        assert_eq!(order.pickup_location(), Some(merchant_location()));
        assert_eq!(order.items()[0].price_at_order_time.cents(), PRICE);
        let prices = order.prices().unwrap();
        assert_eq!(prices.total, prices.subtotal + prices.delivery_fee - prices.discount);
        assert_eq!(h.stock().await, 7);

        let stored = h.engine.get_order(order.id().unwrap()).await.unwrap();
        assert_eq!(stored.pickup_code().unwrap().as_str(), PICKUP);
    }

    #[tokio::test]
    async fn codes_are_generated_when_missing() {
        let h = TestHarness::new().await;
        let mut request = h.checkout(1);
        request.pickup_code = None;
        request.delivery_code = None;

        let order = h.engine.create_order(request).await.unwrap();
        let code = order.pickup_code().unwrap().as_str();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn stale_delivery_fee_is_rejected_without_side_effects() {
        let h = TestHarness::new().await;
        let mut request = h.checkout(2);
        request.prices = OrderPrices::new(
            Money::from_cents(2 * PRICE),
            Money::from_cents(300),
            Money::zero(),
        );

        let err = h.engine.create_order(request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.stock().await, 10);
        // Only the product registration is stored.
        assert_eq!(h.store.event_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_and_inactive_zones_are_rejected() {
        let h = TestHarness::new().await;

        let mut request = h.checkout(1);
        request.zone_id = "nowhere".into();
        let err = h.engine.create_order(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut request = h.checkout(1);
        request.zone_id = "piassa".into();
        let err = h.engine.create_order(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn manual_location_must_be_served() {
        let h = TestHarness::new().await;

        let mut request = h.checkout(1);
        request.delivery_info.location_source = LocationSource::Manual;
        request.delivery_info.destination = GeoPoint::new(8.05, 38.05);
        let err = h.engine.create_order(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut request = h.checkout(1);
        request.delivery_info.location_source = LocationSource::Manual;
        assert!(h.engine.create_order(request).await.is_ok());
    }

    #[tokio::test]
    async fn submitted_subtotal_must_match_live_prices() {
        let h = TestHarness::new().await;
        h.engine
            .reprice(h.product_id, Money::from_cents(1_200))
            .await
            .unwrap();

        let err = h.engine.create_order(h.checkout(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let order = h
            .engine
            .create_order(h.checkout_for(h.product_id, 1, 1_200))
            .await
            .unwrap();
        assert_eq!(order.items()[0].price_at_order_time.cents(), 1_200);
    }

    #[tokio::test]
    async fn placed_orders_keep_their_price_after_reprice() {
        let h = TestHarness::new().await;
        let order = h.engine.create_order(h.checkout(1)).await.unwrap();
        h.engine
            .reprice(h.product_id, Money::from_cents(5_000))
            .await
            .unwrap();

        let stored = h.engine.get_order(order.id().unwrap()).await.unwrap();
        assert_eq!(stored.items()[0].price_at_order_time.cents(), PRICE);
    }

    #[tokio::test]
    async fn basic_shape_is_validated() {
        let h = TestHarness::new().await;

        let mut request = h.checkout(1);
        request.items.clear();
        assert_eq!(
            h.engine.create_order(request).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut request = h.checkout(1);
        request.items[0].quantity = 0;
        assert_eq!(
            h.engine.create_order(request).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut request = h.checkout(1);
        request.delivery_info.contact.phone = " ".into();
        assert_eq!(
            h.engine.create_order(request).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut request = h.checkout(1);
        request.delivery_info.destination = GeoPoint::new(91.0, 0.0);
        assert_eq!(
            h.engine.create_order(request).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn duplicate_lines_are_merged() {
        let h = TestHarness::new().await;
        let mut request = h.checkout(1);
        request.items.push(CheckoutItem {
            product_id: h.product_id,
            quantity: 2,
        });
        request.prices = OrderPrices::new(
            Money::from_cents(3 * PRICE),
            Money::from_cents(FEE),
            Money::zero(),
        );

        let order = h.engine.create_order(request).await.unwrap();
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity, 3);
        assert_eq!(h.stock().await, 7);
    }

    #[tokio::test]
    async fn items_from_two_merchants_are_rejected() {
        let h = TestHarness::new().await;
        let other = h
            .engine
            .register_product(MerchantId::new(), "Kitfo".into(), Money::from_cents(PRICE), 5)
            .await
            .unwrap();
        let mut request = h.checkout(1);
        request.items.push(CheckoutItem {
            product_id: other.product_id().unwrap(),
            quantity: 1,
        });
        request.prices = OrderPrices::new(
            Money::from_cents(2 * PRICE),
            Money::from_cents(FEE),
            Money::zero(),
        );

        let err = h.engine.create_order(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.stock().await, 10);
    }

    #[tokio::test]
    async fn unknown_product_and_merchant_are_not_found() {
        let h = TestHarness::new().await;

        let request = h.checkout_for(ProductId::new(), 1, PRICE);
        let err = h.engine.create_order(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let stranger = h
            .engine
            .register_product(MerchantId::new(), "Firfir".into(), Money::from_cents(PRICE), 5)
            .await
            .unwrap();
        let request = h.checkout_for(stranger.product_id().unwrap(), 1, PRICE);
        let err = h.engine.create_order(request).await.unwrap_err();
        assert!(matches!(err, SettlementError::MerchantNotFound(_)));
    }

    #[tokio::test]
    async fn insufficient_stock_is_reported() {
        let h = TestHarness::new().await;
        let err = h.engine.create_order(h.checkout(11)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(h.stock().await, 10);
    }

    #[tokio::test]
    async fn oversized_amounts_are_validation_errors() {
        let h = TestHarness::new().await;

        let err = h
            .engine
            .register_product(
                h.merchant_id,
                "Gold leaf".into(),
                Money::from_cents(i64::MAX / 2 + 1),
                5,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut request = h.checkout(1);
        request.prices = OrderPrices::new(
            Money::from_cents(i64::MAX),
            Money::from_cents(FEE),
            Money::zero(),
        );
        let err = h.engine.create_order(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h
            .engine
            .create_order(h.checkout(u32::MAX))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(h.stock().await, 10);
    }

    #[tokio::test]
    async fn restock_past_stock_limit_leaves_product_usable() {
        let h = TestHarness::new().await;

        let err = h.engine.restock(h.product_id, u32::MAX).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.stock().await, 10);

        h.engine.create_order(h.checkout(1)).await.unwrap();
        assert_eq!(h.stock().await, 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_never_oversell() {
        let h = TestHarness::new().await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = h.engine.clone();
            let request = h.checkout(6);
            handles.push(tokio::spawn(async move { engine.create_order(request).await }));
        }

        let mut placed = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => placed += 1,
                Err(e) if e.kind() == ErrorKind::InsufficientStock => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(placed, 1);
        assert_eq!(rejected, 1);
        assert_eq!(h.stock().await, 4);
    }

    #[tokio::test]
    async fn merchant_is_notified_in_the_background() {
        let h = TestHarness::new().await;
        let order = h.engine.create_order(h.checkout(1)).await.unwrap();

        let mut sent = Vec::new();
        for _ in 0..50 {
            sent = h.notifier.sent().await;
            if !sent.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].order_id, order.id().unwrap());
        assert_eq!(sent[0].merchant_id, h.merchant_id);
        assert_eq!(sent[0].total.cents(), PRICE + FEE);
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_checkout() {
        let h = TestHarness::new().await;
        h.notifier.set_fail(true);

        let order = h.engine.create_order(h.checkout(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(h.notifier.sent().await.is_empty());
        assert!(h.engine.get_order(order.id().unwrap()).await.is_ok());
    }
}

mod transitions {
    use super::*;

    #[tokio::test]
    async fn full_delivery_credits_driver_once() {
        let h = TestHarness::new().await;
        let order_id = h.ready_order().await;
        let before = h.engine.get_order(order_id).await.unwrap().status_history().len();

        h.step(
            order_id,
            TransitionRequest::new(h.driver(), OrderStatus::AcceptedByDriver)
                .with_pickup_code(PICKUP.to_lowercase())
                .with_location(GeoPoint::new(9.02, 38.77)),
        )
        .await;
        let on_the_way = h
            .step(order_id, TransitionRequest::new(h.driver(), OrderStatus::OnTheWay))
            .await;
        assert!(on_the_way.driver_total_distance_km() > 0.0);

        let outcome = h
            .engine
            .transition_order(
                order_id,
                TransitionRequest::new(h.driver(), OrderStatus::Completed)
                    .with_delivery_code(DELIVERY.to_lowercase()),
            )
            .await
            .unwrap();

        let order = outcome.order;
        assert_eq!(order.status(), OrderStatus::Completed);
        assert_eq!(order.status_history().len(), before + 3);
        assert_eq!(order.driver_id(), Some(h.driver_id));
        assert_eq!(order.payment().unwrap().status, PaymentStatus::Completed);
        assert_eq!(order.on_time_delivery(), Some(true));
        assert!(order.driver_total_distance_km() > on_the_way.driver_total_distance_km());

        let earnings = outcome.earnings.unwrap();
        assert_eq!(earnings.amount.cents(), 400);
        assert_eq!(earnings.idempotency_key, Some(earnings_key(order_id)));

        let wallet = h
            .engine
            .get_wallet(WalletOwner::driver(h.driver_id))
            .await
            .unwrap();
        assert_eq!(wallet.balance().cents(), 400);
        assert_eq!(wallet.transactions().len(), 1);
        assert!(
            h.store
                .idempotency_key_exists(&earnings_key(order_id))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn completing_right_after_pickup_routes_via_the_merchant() {
        let h = TestHarness::new().await;
        let order_id = h.ready_order().await;
        let start = GeoPoint::new(9.02, 38.77);

        h.step(
            order_id,
            TransitionRequest::new(h.driver(), OrderStatus::AcceptedByDriver)
                .with_pickup_code(PICKUP)
                .with_location(start),
        )
        .await;
        let order = h
            .step(
                order_id,
                TransitionRequest::new(h.driver(), OrderStatus::Completed)
                    .with_delivery_code(DELIVERY),
            )
            .await;

        let expected = start.distance_km(&merchant_location())
            + merchant_location().distance_km(&destination());
        assert!((order.driver_total_distance_km() - expected).abs() < 1e-9);
        assert_eq!(order.last_known_location(), Some(destination()));
    }

    #[tokio::test]
    async fn wrong_pickup_code_leaves_order_unchanged() {
        let h = TestHarness::new().await;
        let order_id = h.ready_order().await;
        let before = h.engine.get_order(order_id).await.unwrap();

        let err = h
            .engine
            .transition_order(
                order_id,
                TransitionRequest::new(h.driver(), OrderStatus::AcceptedByDriver)
                    .with_pickup_code("ZZZZZZ"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);

        let missing = h
            .engine
            .transition_order(
                order_id,
                TransitionRequest::new(h.driver(), OrderStatus::AcceptedByDriver),
            )
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::InvalidCode);

        let after = h.engine.get_order(order_id).await.unwrap();
        assert_eq!(after.status(), OrderStatus::ReadyToDeliver);
        assert_eq!(after.version(), before.version());
        assert!(after.driver_id().is_none());
    }

    #[tokio::test]
    async fn wrong_delivery_code_does_not_credit() {
        let h = TestHarness::new().await;
        let order_id = h.order_on_the_way().await;

        let err = h
            .engine
            .transition_order(
                order_id,
                TransitionRequest::new(h.driver(), OrderStatus::Completed)
                    .with_delivery_code(PICKUP),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);
        assert!(
            h.engine
                .get_wallet(WalletOwner::driver(h.driver_id))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn transitions_outside_the_table_are_rejected() {
        let h = TestHarness::new().await;
        let order = h.engine.create_order(h.checkout(1)).await.unwrap();
        let order_id = order.id().unwrap();

        for (actor, target) in [
            (h.driver(), OrderStatus::Completed),
            (h.merchant(), OrderStatus::ReadyToDeliver),
            (h.driver(), OrderStatus::OnTheWay),
            (h.merchant(), OrderStatus::Pending),
        ] {
            let err = h
                .engine
                .transition_order(order_id, TransitionRequest::new(actor, target))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTransition, "{target}");
        }

        let after = h.engine.get_order(order_id).await.unwrap();
        assert_eq!(after.status(), OrderStatus::Pending);
        assert_eq!(after.version(), order.version());
    }

    #[tokio::test]
    async fn only_the_owning_merchant_may_accept() {
        let h = TestHarness::new().await;
        let order = h.engine.create_order(h.checkout(1)).await.unwrap();

        let err = h
            .engine
            .transition_order(
                order.id().unwrap(),
                TransitionRequest::new(
                    Actor::Merchant(MerchantId::new()),
                    OrderStatus::AcceptedByMerchant,
                ),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPermitted);
    }

    #[tokio::test]
    async fn unapproved_driver_cannot_pick_up() {
        let h = TestHarness::new().await;
        let order_id = h.ready_order().await;
        let stranger = DriverId::new();

        let err = h
            .engine
            .transition_order(
                order_id,
                TransitionRequest::new(Actor::Driver(stranger), OrderStatus::AcceptedByDriver)
                    .with_pickup_code(PICKUP),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::DriverNotApproved { .. }));
        assert_eq!(err.kind(), ErrorKind::NotPermitted);

        // Approval is checked before the code.
        let err = h
            .engine
            .transition_order(
                order_id,
                TransitionRequest::new(Actor::Driver(stranger), OrderStatus::AcceptedByDriver)
                    .with_pickup_code("000000"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPermitted);

        // Revoked approval counts the same.
        h.drivers.set_approved(h.driver_id, false).await.unwrap();
        let err = h
            .engine
            .transition_order(
                order_id,
                TransitionRequest::new(h.driver(), OrderStatus::AcceptedByDriver)
                    .with_pickup_code(PICKUP),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPermitted);
    }

    #[tokio::test]
    async fn only_the_assigned_driver_may_complete() {
        let h = TestHarness::new().await;
        let order_id = h.order_on_the_way().await;
        let other = DriverId::new();
        h.drivers.set_approved(other, true).await.unwrap();

        let err = h
            .engine
            .transition_order(
                order_id,
                TransitionRequest::new(Actor::Driver(other), OrderStatus::Completed)
                    .with_delivery_code(DELIVERY),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPermitted);
    }

    #[tokio::test]
    async fn merchant_rejection_releases_stock_once() {
        let h = TestHarness::new().await;
        let order = h.engine.create_order(h.checkout(4)).await.unwrap();
        let order_id = order.id().unwrap();
        assert_eq!(h.stock().await, 6);

        h.step(
            order_id,
            TransitionRequest::new(h.merchant(), OrderStatus::RejectedByMerchant),
        )
        .await;
        assert_eq!(h.stock().await, 10);

        let err = h
            .engine
            .transition_order(
                order_id,
                TransitionRequest::new(h.merchant(), OrderStatus::CanceledByMerchant),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(h.stock().await, 10);
    }

    #[tokio::test]
    async fn merchant_cancellation_after_ready_releases_stock() {
        let h = TestHarness::new().await;
        let order_id = h.ready_order().await;
        assert_eq!(h.stock().await, 8);

        let order = h
            .step(
                order_id,
                TransitionRequest::new(h.merchant(), OrderStatus::CanceledByMerchant),
            )
            .await;
        assert!(order.is_terminal());
        assert_eq!(h.stock().await, 10);
    }

    #[tokio::test]
    async fn driver_abandonment_keeps_stock_reserved() {
        let h = TestHarness::new().await;
        let order_id = h.order_on_the_way().await;

        let order = h
            .step(
                order_id,
                TransitionRequest::new(h.driver(), OrderStatus::CanceledByDriver),
            )
            .await;
        assert_eq!(order.status(), OrderStatus::CanceledByDriver);
        assert_eq!(h.stock().await, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn simultaneous_completions_credit_once() {
        let h = TestHarness::new().await;
        let order_id = h.order_on_the_way().await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = h.engine.clone();
            let request = TransitionRequest::new(h.driver(), OrderStatus::Completed)
                .with_delivery_code(DELIVERY);
            handles.push(tokio::spawn(async move {
                engine.transition_order(order_id, request).await
            }));
        }

        let mut completed = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) => {
                    assert_eq!(outcome.earnings.unwrap().amount.cents(), 400);
                    completed += 1;
                }
                Err(e) if e.kind() == ErrorKind::InvalidTransition => refused += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(refused, 3);

        let wallet = h
            .engine
            .get_wallet(WalletOwner::driver(h.driver_id))
            .await
            .unwrap();
        assert_eq!(wallet.balance().cents(), 400);
        assert_eq!(wallet.transactions().len(), 1);
        assert!(wallet.reconciles());
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let h = TestHarness::new().await;
        let err = h
            .engine
            .transition_order(
                AggregateId::new(),
                TransitionRequest::new(h.merchant(), OrderStatus::AcceptedByMerchant),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(h.engine.order_history(AggregateId::new()).await.is_err());
    }

    #[tokio::test]
    async fn history_lists_every_event() {
        let h = TestHarness::new().await;
        let order_id = h.ready_order().await;

        let history = h.engine.order_history(order_id).await.unwrap();
        let types: Vec<_> = history.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["OrderPlaced", "StatusChanged", "StatusChanged", "StatusChanged"]
        );
    }
}

mod routing {
    use super::*;

    struct StalledRouter;

    #[async_trait]
    impl RouteResolver for StalledRouter {
        async fn route(&self, _: GeoPoint, _: GeoPoint) -> Result<RouteLeg, SettlementError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(RouteLeg::new(100.0, 10_000, false))
        }
    }

    #[tokio::test]
    async fn routing_timeout_falls_back_to_straight_line() {
        let router = ResilientRouter::new(Arc::new(StalledRouter), Duration::from_millis(20), 25.0);
        let h = TestHarness::with_router(router).await;
        let start = GeoPoint::new(9.02, 38.77);

        let order_id = h.ready_order().await;
        h.step(
            order_id,
            TransitionRequest::new(h.driver(), OrderStatus::AcceptedByDriver)
                .with_pickup_code(PICKUP)
                .with_location(start),
        )
        .await;
        let order = h
            .step(order_id, TransitionRequest::new(h.driver(), OrderStatus::OnTheWay))
            .await;

        let expected = start.distance_km(&merchant_location());
        assert!((order.driver_total_distance_km() - expected).abs() < 1e-9);
        assert_eq!(order.last_known_location(), Some(merchant_location()));
    }
}

mod withdrawals {
    use super::*;

    async fn earned(h: &TestHarness) -> WalletOwner {
        let order_id = h.order_on_the_way().await;
        h.step(
            order_id,
            TransitionRequest::new(h.driver(), OrderStatus::Completed).with_delivery_code(DELIVERY),
        )
        .await;
        WalletOwner::driver(h.driver_id)
    }

    #[tokio::test]
    async fn second_open_withdrawal_is_refused() {
        let h = TestHarness::new().await;
        let owner = earned(&h).await;

        h.engine
            .request_withdrawal(owner, Money::from_cents(100), "+251933000000")
            .await
            .unwrap();
        let err = h
            .engine
            .request_withdrawal(owner, Money::from_cents(100), "+251933000000")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicatePendingWithdrawal);
    }

    #[tokio::test]
    async fn withdrawal_cannot_exceed_balance() {
        let h = TestHarness::new().await;
        let owner = earned(&h).await;

        let err = h
            .engine
            .request_withdrawal(owner, Money::from_cents(401), "+251933000000")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    }

    #[tokio::test]
    async fn failed_payout_refunds_the_wallet() {
        let h = TestHarness::new().await;
        let owner = earned(&h).await;

        let withdrawal = h
            .engine
            .request_withdrawal(owner, Money::from_cents(400), "+251933000000")
            .await
            .unwrap();
        assert_eq!(h.engine.get_wallet(owner).await.unwrap().balance(), Money::zero());

        h.engine
            .mark_withdrawal_pending(owner, withdrawal.id, "PAYOUT-1")
            .await
            .unwrap();
        let settled = h
            .engine
            .settle_withdrawal(
                owner,
                withdrawal.id,
                PayoutOutcome::Failed {
                    reason: "account closed".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(settled.status, WithdrawalStatus::Failed);

        let wallet = h.engine.get_wallet(owner).await.unwrap();
        assert_eq!(wallet.balance().cents(), 400);
        assert!(wallet.reconciles());

        // The wallet is free for a new withdrawal.
        h.engine
            .request_withdrawal(owner, Money::from_cents(400), "+251933000000")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn successful_payout_requires_pending() {
        let h = TestHarness::new().await;
        let owner = earned(&h).await;
        let withdrawal = h
            .engine
            .request_withdrawal(owner, Money::from_cents(400), "+251933000000")
            .await
            .unwrap();

        let err = h
            .engine
            .settle_withdrawal(owner, withdrawal.id, PayoutOutcome::Succeeded)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        h.engine
            .mark_withdrawal_pending(owner, withdrawal.id, "PAYOUT-2")
            .await
            .unwrap();
        let settled = h
            .engine
            .settle_withdrawal(owner, withdrawal.id, PayoutOutcome::Succeeded)
            .await
            .unwrap();
        assert_eq!(settled.status, WithdrawalStatus::Completed);
        assert_eq!(h.engine.get_wallet(owner).await.unwrap().balance(), Money::zero());
    }
}
