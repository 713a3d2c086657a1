//! Order event scripts shared by the view tests.

use chrono::{DateTime, Duration, Utc};
use common::{AggregateId, DriverId, MerchantId, ProductId, UserId};
use domain::{
    Actor, Aggregate, Contact, DeliveryInfo, DomainEvent, GeoPoint, LineItem, LocationSource,
    Money, Order, OrderEvent, OrderPrices, OrderStatus, PlaceOrder, RouteLeg, TransitionContext,
    VerificationCode,
};
use event_store::{EventEnvelope, Version};

pub(crate) const PICKUP: &str = "PICK01";
pub(crate) const DELIVERY: &str = "DROP01";

pub(crate) fn envelope(order_id: AggregateId, version: i64, event: &OrderEvent) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(order_id)
        .aggregate_type("Order")
        .event_type(event.event_type())
        .version(Version::new(version))
        .payload(event)
        .unwrap()
        .build()
}

/// Drives a real order aggregate and records its events as envelopes.
pub(crate) struct OrderScript {
    pub order: Order,
    pub order_id: AggregateId,
    pub merchant_id: MerchantId,
    pub envelopes: Vec<EventEnvelope>,
}

impl OrderScript {
    pub fn placed(zone_id: &str, fee_cents: i64) -> Self {
        Self::placed_with_eta(zone_id, fee_cents, Some(Utc::now() + Duration::hours(1)))
    }

    pub fn placed_with_eta(zone_id: &str, fee_cents: i64, eta: Option<DateTime<Utc>>) -> Self {
        let order_id = AggregateId::new();
        let merchant_id = MerchantId::new();
        let items = vec![LineItem::new(
            ProductId::new(),
            "Shiro",
            2,
            Money::from_cents(750),
        )];
        let cmd = PlaceOrder {
            order_id,
            user_id: UserId::new(),
            merchant_id,
            zone_id: zone_id.into(),
            items,
            prices: OrderPrices::new(
                Money::from_cents(1_500),
                Money::from_cents(fee_cents),
                Money::zero(),
            ),
            delivery_info: DeliveryInfo {
                destination: GeoPoint::new(9.03, 38.74),
                location_source: LocationSource::Gps,
                contact: Contact {
                    name: "Abel".into(),
                    phone: "+251911222333".into(),
                },
                notes: None,
                resolved_address: None,
                estimated_delivery_at: eta,
            },
            pickup_location: GeoPoint::new(9.01, 38.76),
            pickup_code: Some(VerificationCode::new(PICKUP)),
            delivery_code: Some(VerificationCode::new(DELIVERY)),
            payment: None,
            placed_at: Utc::now(),
        };

        let mut script = Self {
            order: Order::default(),
            order_id,
            merchant_id,
            envelopes: Vec::new(),
        };
        let events = script.order.place(cmd).unwrap();
        script.record(events);
        script
    }

    fn record(&mut self, events: Vec<OrderEvent>) {
        for event in events {
            let version = self.envelopes.len() as i64 + 1;
            self.envelopes
                .push(envelope(self.order_id, version, &event));
            self.order.apply(event);
        }
    }

    pub fn step(&mut self, actor: Actor, target: OrderStatus, ctx: TransitionContext) -> &mut Self {
        let events = self.order.transition(actor, target, ctx).unwrap();
        self.record(events);
        self
    }

    pub fn merchant(&mut self, target: OrderStatus) -> &mut Self {
        let actor = Actor::Merchant(self.merchant_id);
        self.step(actor, target, TransitionContext::default())
    }

    /// Walks the merchant half of the lifecycle up to READY_TO_DELIVER.
    pub fn ready(&mut self) -> &mut Self {
        self.merchant(OrderStatus::AcceptedByMerchant)
            .merchant(OrderStatus::InPreparation)
            .merchant(OrderStatus::ReadyToDeliver)
    }

    pub fn pick_up(&mut self, driver_id: DriverId) -> &mut Self {
        self.step(
            Actor::Driver(driver_id),
            OrderStatus::AcceptedByDriver,
            TransitionContext::default()
                .with_pickup_code(PICKUP)
                .with_location(GeoPoint::new(9.02, 38.77)),
        )
    }

    pub fn head_out(&mut self, driver_id: DriverId, km: f64) -> &mut Self {
        self.step(
            Actor::Driver(driver_id),
            OrderStatus::OnTheWay,
            TransitionContext::default().with_leg(RouteLeg::new(km, (km * 144.0) as i64, false)),
        )
    }

    pub fn complete(&mut self, driver_id: DriverId, km: f64) -> &mut Self {
        self.step(
            Actor::Driver(driver_id),
            OrderStatus::Completed,
            TransitionContext::default()
                .with_delivery_code(DELIVERY)
                .with_leg(RouteLeg::new(km, (km * 144.0) as i64, false)),
        )
    }

    /// Picks up, heads out and completes with the given leg lengths.
    pub fn deliver(&mut self, driver_id: DriverId, to_merchant_km: f64, to_customer_km: f64) -> &mut Self {
        self.ready()
            .pick_up(driver_id)
            .head_out(driver_id, to_merchant_km)
            .complete(driver_id, to_customer_km)
    }
}
