//! Integration tests: OrderEngine commands → ProjectionProcessor → views.

use std::sync::Arc;

use chrono::Utc;
use common::{AggregateId, DriverId, MerchantId, ProductId, UserId};
use domain::{
    Actor, Aggregate, Contact, DeliveryInfo, GeoPoint, LocationSource, Money, OrderPrices, OrderStatus,
};
use event_store::InMemoryEventStore;
use projections::{DeliveryBoardView, DriverEarningsView, ProjectionProcessor};
use settlement::{
    CheckoutItem, Collaborators, CreateOrderRequest, DeliveryZone, DriverDirectory, EngineConfig,
    InMemoryDriverDirectory, InMemoryMerchantDirectory, InMemoryZoneDirectory, LoggingNotifier,
    MerchantDirectory, MerchantProfile, OrderEngine, ResilientRouter, TransitionRequest,
    ZoneStatus,
};

const PICKUP: &str = "B0B0B0";
const DELIVERY: &str = "C0C0C0";

struct Setup {
    engine: OrderEngine<InMemoryEventStore>,
    processor: ProjectionProcessor<InMemoryEventStore>,
    board: DeliveryBoardView,
    earnings: DriverEarningsView,
    merchant_id: MerchantId,
    product_id: ProductId,
    driver_id: DriverId,
}

async fn setup() -> Setup {
    let store = InMemoryEventStore::new();
    let zones = InMemoryZoneDirectory::new([DeliveryZone {
        id: "bole".into(),
        name: "Bole".into(),
        status: ZoneStatus::Active,
        delivery_fee: Money::from_cents(500),
        polygon: vec![
            GeoPoint::new(9.0, 38.7),
            GeoPoint::new(9.0, 38.8),
            GeoPoint::new(9.1, 38.8),
            GeoPoint::new(9.1, 38.7),
        ],
    }]);
    let drivers = InMemoryDriverDirectory::new();
    let merchants = InMemoryMerchantDirectory::new();
    let collaborators = Collaborators::new(
        Arc::new(zones),
        Arc::new(drivers.clone()),
        Arc::new(merchants.clone()),
        ResilientRouter::straight_line(25.0),
        Arc::new(LoggingNotifier),
    );
    let engine = OrderEngine::new(store.clone(), collaborators, EngineConfig::default());

    let merchant_id = MerchantId::new();
    merchants
        .upsert_merchant(MerchantProfile {
            merchant_id,
            name: "Yod Abyssinia".into(),
            location: GeoPoint::new(9.01, 38.76),
        })
        .await
        .unwrap();
    let driver_id = DriverId::new();
    drivers.set_approved(driver_id, true).await.unwrap();
    let product = engine
        .register_product(merchant_id, "Beyaynetu".into(), Money::from_cents(900), 50)
        .await
        .unwrap();

    let board = DeliveryBoardView::new();
    let earnings = DriverEarningsView::new();
    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(board.clone()));
    processor.register(Box::new(earnings.clone()));

    Setup {
        engine,
        processor,
        board,
        earnings,
        merchant_id,
        product_id: product.product_id().unwrap(),
        driver_id,
    }
}

impl Setup {
    async fn ready_order(&self) -> AggregateId {
        let order = self
            .engine
            .create_order(CreateOrderRequest {
                user_id: UserId::new(),
                zone_id: "bole".into(),
                items: vec![CheckoutItem {
                    product_id: self.product_id,
                    quantity: 1,
                }],
                delivery_info: DeliveryInfo {
                    destination: GeoPoint::new(9.03, 38.74),
                    location_source: LocationSource::Gps,
                    contact: Contact {
                        name: "Selam".into(),
                        phone: "+251911444555".into(),
                    },
                    notes: None,
                    resolved_address: None,
                    estimated_delivery_at: Some(Utc::now() + chrono::Duration::hours(1)),
                },
                prices: OrderPrices::new(
                    Money::from_cents(900),
                    Money::from_cents(500),
                    Money::zero(),
                ),
                payment: None,
                pickup_code: Some(PICKUP.into()),
                delivery_code: Some(DELIVERY.into()),
            })
            .await
            .unwrap();
        let order_id = order.id().unwrap();
        for target in [
            OrderStatus::AcceptedByMerchant,
            OrderStatus::InPreparation,
            OrderStatus::ReadyToDeliver,
        ] {
            self.engine
                .transition_order(
                    order_id,
                    TransitionRequest::new(Actor::Merchant(self.merchant_id), target),
                )
                .await
                .unwrap();
        }
        order_id
    }

    async fn deliver(&self, order_id: AggregateId) {
        let driver = Actor::Driver(self.driver_id);
        self.engine
            .transition_order(
                order_id,
                TransitionRequest::new(driver, OrderStatus::AcceptedByDriver)
                    .with_pickup_code(PICKUP)
                    .with_location(GeoPoint::new(9.02, 38.77)),
            )
            .await
            .unwrap();
        self.engine
            .transition_order(order_id, TransitionRequest::new(driver, OrderStatus::OnTheWay))
            .await
            .unwrap();
        self.engine
            .transition_order(
                order_id,
                TransitionRequest::new(driver, OrderStatus::Completed).with_delivery_code(DELIVERY),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn ready_orders_show_on_the_board_until_picked_up() {
    let s = setup().await;
    let first = s.ready_order().await;
    let second = s.ready_order().await;

    s.processor.run_catch_up().await.unwrap();
    let available = s.board.available().await;
    assert_eq!(available.len(), 2);
    assert_eq!(available[0].order_id, first);
    assert_eq!(available[0].driver_earnings.cents(), 400);

    s.deliver(first).await;
    s.processor.run_catch_up().await.unwrap();

    let available = s.board.available().await;
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].order_id, second);
}

#[tokio::test]
async fn completed_deliveries_feed_driver_earnings() {
    let s = setup().await;
    for _ in 0..3 {
        let order_id = s.ready_order().await;
        s.deliver(order_id).await;
    }

    s.processor.run_catch_up().await.unwrap();
    let stats = s.earnings.get_driver(s.driver_id).await.unwrap();
    assert_eq!(stats.completed_deliveries, 3);
    assert_eq!(stats.total_earnings.cents(), 1_200);
    assert_eq!(stats.on_time_deliveries, 3);
    assert!(stats.total_distance_km > 0.0);
    assert!(stats.active_orders.is_empty());

    // The wallet and the read model agree.
    let wallet = s
        .engine
        .get_wallet(domain::WalletOwner::driver(s.driver_id))
        .await
        .unwrap();
    assert_eq!(wallet.balance(), stats.total_earnings);
}

#[tokio::test]
async fn rebuild_reproduces_the_same_views() {
    let s = setup().await;
    let order_id = s.ready_order().await;
    s.deliver(order_id).await;
    s.ready_order().await;

    s.processor.run_catch_up().await.unwrap();
    let board_before = s.board.available().await;
    let stats_before = s.earnings.get_driver(s.driver_id).await;

    s.processor.rebuild_all().await.unwrap();
    assert_eq!(s.board.available().await, board_before);
    assert_eq!(s.earnings.get_driver(s.driver_id).await, stats_before);
}
