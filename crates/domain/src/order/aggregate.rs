//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, DriverId, MerchantId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::values::{GeoPoint, Money};

use super::{
    Actor, CodeKind, DeliveryInfo, LineItem, OrderError, OrderEvent, OrderPrices, OrderStatus,
    Payment, PaymentStatus, StatusEntry, StepOwner, VerificationCode,
    events::{
        DriverAssignedData, LegTravelledData, OrderDeliveredData, OrderPlacedData,
        PaymentCompletedData, StatusChangedData,
    },
    merge_line_items,
    value_objects::RouteLeg,
};

/// Share of the delivery fee credited to the driver, in percent. The rest is
/// the platform fee.
pub const DRIVER_EARNINGS_PERCENT: i64 = 80;

/// Everything checkout has resolved for a new order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub merchant_id: MerchantId,
    pub zone_id: String,
    pub items: Vec<LineItem>,
    pub prices: OrderPrices,
    pub delivery_info: DeliveryInfo,
    pub pickup_location: GeoPoint,
    pub pickup_code: Option<VerificationCode>,
    pub delivery_code: Option<VerificationCode>,
    pub payment: Option<Payment>,
    pub placed_at: DateTime<Utc>,
}

/// Inputs that accompany a transition request.
#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub pickup_code: Option<String>,
    pub delivery_code: Option<String>,
    /// Driver's current position, if reported.
    pub location: Option<GeoPoint>,
    /// Legs resolved for [`Order::legs_for`], in the same order.
    pub legs: Vec<RouteLeg>,
    pub now: DateTime<Utc>,
}

impl Default for TransitionContext {
    fn default() -> Self {
        Self {
            pickup_code: None,
            delivery_code: None,
            location: None,
            legs: Vec::new(),
            now: Utc::now(),
        }
    }
}

impl TransitionContext {
    pub fn with_pickup_code(mut self, code: impl Into<String>) -> Self {
        self.pickup_code = Some(code.into());
        self
    }

    pub fn with_delivery_code(mut self, code: impl Into<String>) -> Self {
        self.delivery_code = Some(code.into());
        self
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_leg(mut self, leg: RouteLeg) -> Self {
        self.legs.push(leg);
        self
    }
}

/// Order aggregate root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    status: OrderStatus,
    user_id: Option<UserId>,
    merchant_id: Option<MerchantId>,
    driver_id: Option<DriverId>,
    zone_id: String,
    items: Vec<LineItem>,
    prices: Option<OrderPrices>,
    delivery_info: Option<DeliveryInfo>,
    pickup_location: Option<GeoPoint>,
    pickup_code: Option<VerificationCode>,
    delivery_code: Option<VerificationCode>,
    payment: Option<Payment>,
    status_history: Vec<StatusEntry>,

    driver_total_distance_km: f64,
    driver_total_duration_secs: i64,
    last_known_location: Option<GeoPoint>,

    on_time_delivery: Option<bool>,
    driver_earnings: Option<Money>,
    placed_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(*data),
            OrderEvent::StatusChanged(data) => self.apply_status_changed(data),
            OrderEvent::DriverAssigned(data) => self.apply_driver_assigned(data),
            OrderEvent::LegTravelled(data) => self.apply_leg_travelled(data),
            OrderEvent::PaymentCompleted(_) => {
                if let Some(payment) = self.payment.as_mut() {
                    payment.status = PaymentStatus::Completed;
                }
            }
            OrderEvent::OrderDelivered(data) => self.apply_order_delivered(data),
        }
    }
}

// Query methods
impl Order {
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn merchant_id(&self) -> Option<MerchantId> {
        self.merchant_id
    }

    pub fn driver_id(&self) -> Option<DriverId> {
        self.driver_id
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn prices(&self) -> Option<&OrderPrices> {
        self.prices.as_ref()
    }

    pub fn delivery_info(&self) -> Option<&DeliveryInfo> {
        self.delivery_info.as_ref()
    }

    pub fn pickup_location(&self) -> Option<GeoPoint> {
        self.pickup_location
    }

    pub fn pickup_code(&self) -> Option<&VerificationCode> {
        self.pickup_code.as_ref()
    }

    pub fn delivery_code(&self) -> Option<&VerificationCode> {
        self.delivery_code.as_ref()
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    pub fn status_history(&self) -> &[StatusEntry] {
        &self.status_history
    }

    pub fn driver_total_distance_km(&self) -> f64 {
        self.driver_total_distance_km
    }

    pub fn driver_total_duration_secs(&self) -> i64 {
        self.driver_total_duration_secs
    }

    pub fn last_known_location(&self) -> Option<GeoPoint> {
        self.last_known_location
    }

    pub fn on_time_delivery(&self) -> Option<bool> {
        self.on_time_delivery
    }

    /// Amount credited to the driver, set once the order is delivered.
    pub fn recorded_driver_earnings(&self) -> Option<Money> {
        self.driver_earnings
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.id.is_some() && self.status.can_transition_to(target)
    }

    /// What the driver earns for delivering this order.
    pub fn driver_earnings(&self) -> Money {
        self.prices
            .map(|p| p.delivery_fee.ratio(DRIVER_EARNINGS_PERCENT, 100))
            .unwrap_or_default()
    }

    /// Endpoints of the legs a transition to `target` covers. Stops that
    /// are not known are skipped.
    ///
    /// Heading out covers the way to the merchant; completing covers the way
    /// to the customer, passing the merchant first if the driver never
    /// headed out.
    pub fn legs_for(
        &self,
        target: OrderStatus,
        reported: Option<GeoPoint>,
    ) -> Vec<(GeoPoint, GeoPoint)> {
        let start = self.last_known_location.or(reported);
        let destination = self.delivery_info.as_ref().map(|info| info.destination);
        let stops = match target {
            OrderStatus::OnTheWay => vec![start, self.pickup_location],
            OrderStatus::Completed if self.status == OrderStatus::AcceptedByDriver => {
                vec![start, self.pickup_location, destination]
            }
            OrderStatus::Completed => vec![start, destination],
            _ => return Vec::new(),
        };

        let stops: Vec<GeoPoint> = stops.into_iter().flatten().collect();
        stops.windows(2).map(|pair| (pair[0], pair[1])).collect()
    }
}

// Command methods (return events)
impl Order {
    /// Records a checked-out order. Duplicate product lines are merged.
    pub fn place(&self, cmd: PlaceOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }

        let items = merge_line_items(cmd.items);
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(item) = items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id.to_string(),
                quantity: item.quantity,
            });
        }

        let line_sum = items
            .iter()
            .try_fold(Money::zero(), |sum, item| sum.checked_add(item.line_total()?))
            .ok_or(OrderError::AmountOverflow)?;
        if cmd.prices.subtotal != line_sum {
            return Err(OrderError::SubtotalMismatch {
                submitted: cmd.prices.subtotal,
                expected: line_sum,
            });
        }
        if !cmd.prices.is_consistent() {
            return Err(OrderError::InconsistentTotal {
                total: cmd.prices.total,
            });
        }

        if !cmd.delivery_info.contact.is_complete() {
            return Err(OrderError::MissingContact);
        }
        if !cmd.delivery_info.destination.is_valid() || !cmd.pickup_location.is_valid() {
            return Err(OrderError::InvalidCoordinates);
        }

        let pickup_code = cmd
            .pickup_code
            .filter(|c| !c.is_empty())
            .unwrap_or_else(VerificationCode::generate);
        let delivery_code = cmd
            .delivery_code
            .filter(|c| !c.is_empty())
            .unwrap_or_else(VerificationCode::generate);

        Ok(vec![OrderEvent::OrderPlaced(Box::new(OrderPlacedData {
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            merchant_id: cmd.merchant_id,
            zone_id: cmd.zone_id,
            items,
            prices: cmd.prices,
            delivery_info: cmd.delivery_info,
            pickup_location: cmd.pickup_location,
            pickup_code,
            delivery_code,
            payment: cmd.payment.map(|p| Payment {
                status: PaymentStatus::Pending,
                ..p
            }),
            placed_at: cmd.placed_at,
        }))])
    }

    /// Checks the transition table and the actor's role, leaving codes
    /// aside.
    pub fn check_step(&self, actor: &Actor, target: OrderStatus) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        if !self.status.can_transition_to(target) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.authorize(actor, target)
    }

    /// Checks that `actor` may move the order to `target` with the supplied
    /// codes, without producing events.
    pub fn check_transition(
        &self,
        actor: &Actor,
        target: OrderStatus,
        ctx: &TransitionContext,
    ) -> Result<(), OrderError> {
        self.check_step(actor, target)?;

        match target {
            OrderStatus::AcceptedByDriver => {
                Self::verify_code(self.pickup_code.as_ref(), ctx.pickup_code.as_deref(), CodeKind::Pickup)
            }
            OrderStatus::Completed => Self::verify_code(
                self.delivery_code.as_ref(),
                ctx.delivery_code.as_deref(),
                CodeKind::Delivery,
            ),
            _ => Ok(()),
        }
    }

    /// Moves the order to `target`, returning the status change and its side
    /// effects on the order.
    pub fn transition(
        &self,
        actor: Actor,
        target: OrderStatus,
        ctx: TransitionContext,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.check_transition(&actor, target, &ctx)?;

        let now = ctx.now;
        let mut events = Vec::new();

        match target {
            OrderStatus::AcceptedByDriver => {
                let Actor::Driver(driver_id) = actor else {
                    return Err(OrderError::NotPermitted { actor, target });
                };
                events.push(OrderEvent::DriverAssigned(DriverAssignedData {
                    driver_id,
                    start_location: ctx.location,
                    assigned_at: now,
                }));
            }
            OrderStatus::OnTheWay => {
                events.extend(self.travelled(target, &ctx));
            }
            OrderStatus::Completed => {
                events.extend(self.travelled(target, &ctx));

                if self
                    .payment
                    .is_some_and(|p| p.status != PaymentStatus::Completed)
                {
                    events.push(OrderEvent::PaymentCompleted(PaymentCompletedData {
                        completed_at: now,
                    }));
                }

                let driver_id = self.driver_id.ok_or(OrderError::NotPermitted { actor, target })?;
                let on_time = self
                    .delivery_info
                    .as_ref()
                    .and_then(|info| info.estimated_delivery_at)
                    .map(|eta| now <= eta);
                events.push(OrderEvent::OrderDelivered(OrderDeliveredData {
                    driver_id,
                    delivered_at: now,
                    on_time,
                    driver_earnings: self.driver_earnings(),
                }));
            }
            _ => {}
        }

        events.push(OrderEvent::status_changed(self.status, target, actor, now));
        Ok(events)
    }

    fn authorize(&self, actor: &Actor, target: OrderStatus) -> Result<(), OrderError> {
        let permitted = match (target.step_owner(), actor) {
            (Some(StepOwner::Merchant), Actor::Merchant(id)) => self.merchant_id == Some(*id),
            // Any driver may pick up a ready order; approval is checked by the caller.
            (Some(StepOwner::Driver), Actor::Driver(_))
                if target == OrderStatus::AcceptedByDriver =>
            {
                true
            }
            (Some(StepOwner::Driver), Actor::Driver(id)) => self.driver_id == Some(*id),
            _ => false,
        };

        if permitted {
            Ok(())
        } else {
            Err(OrderError::NotPermitted {
                actor: *actor,
                target,
            })
        }
    }

    fn verify_code(
        expected: Option<&VerificationCode>,
        supplied: Option<&str>,
        kind: CodeKind,
    ) -> Result<(), OrderError> {
        match (expected, supplied) {
            (Some(expected), Some(supplied)) if expected.matches(supplied) => Ok(()),
            _ => Err(OrderError::InvalidCode { kind }),
        }
    }

    fn travelled(&self, target: OrderStatus, ctx: &TransitionContext) -> Vec<OrderEvent> {
        self.legs_for(target, ctx.location)
            .into_iter()
            .zip(&ctx.legs)
            .map(|((from, to), leg)| OrderEvent::leg_travelled(from, to, *leg))
            .collect()
    }
}

// Apply event helpers
impl Order {
    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.status = OrderStatus::Pending;
        self.user_id = Some(data.user_id);
        self.merchant_id = Some(data.merchant_id);
        self.zone_id = data.zone_id;
        self.items = data.items;
        self.prices = Some(data.prices);
        self.delivery_info = Some(data.delivery_info);
        self.pickup_location = Some(data.pickup_location);
        self.pickup_code = Some(data.pickup_code);
        self.delivery_code = Some(data.delivery_code);
        self.payment = data.payment;
        self.placed_at = Some(data.placed_at);
        self.status_history.push(StatusEntry {
            status: OrderStatus::Pending,
            timestamp: data.placed_at,
        });
    }

    fn apply_status_changed(&mut self, data: StatusChangedData) {
        self.status = data.to;
        self.status_history.push(StatusEntry {
            status: data.to,
            timestamp: data.changed_at,
        });
    }

    fn apply_driver_assigned(&mut self, data: DriverAssignedData) {
        self.driver_id = Some(data.driver_id);
        if data.start_location.is_some() {
            self.last_known_location = data.start_location;
        }
    }

    fn apply_leg_travelled(&mut self, data: LegTravelledData) {
        self.driver_total_distance_km += data.leg.distance_km.max(0.0);
        self.driver_total_duration_secs += data.leg.duration_secs.max(0);
        self.last_known_location = Some(data.to);
    }

    fn apply_order_delivered(&mut self, data: OrderDeliveredData) {
        self.delivered_at = Some(data.delivered_at);
        self.on_time_delivery = data.on_time;
        self.driver_earnings = Some(data.driver_earnings);
    }
}
