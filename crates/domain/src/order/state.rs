//! Order status machine.

use serde::{Deserialize, Serialize};

/// Party that performs a given step of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOwner {
    Merchant,
    Driver,
}

/// The status of an order in its lifecycle.
///
/// ```text
/// PENDING ─► ACCEPTED_BY_MERCHANT ─► IN_PREPARATION ─► READY_TO_DELIVER
///                                                            │
///                         COMPLETED ◄─ ON_THE_WAY ◄─ ACCEPTED_BY_DRIVER
/// ```
///
/// A merchant may reject a pending order and cancel it any time before a
/// driver picks it up. A driver may complete straight from pickup, reject
/// right after pickup, or cancel while on the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    AcceptedByMerchant,
    InPreparation,
    ReadyToDeliver,
    AcceptedByDriver,
    OnTheWay,
    Completed,
    RejectedByMerchant,
    RejectedByDriver,
    CanceledByMerchant,
    CanceledByDriver,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 11] = [
        OrderStatus::Pending,
        OrderStatus::AcceptedByMerchant,
        OrderStatus::InPreparation,
        OrderStatus::ReadyToDeliver,
        OrderStatus::AcceptedByDriver,
        OrderStatus::OnTheWay,
        OrderStatus::Completed,
        OrderStatus::RejectedByMerchant,
        OrderStatus::RejectedByDriver,
        OrderStatus::CanceledByMerchant,
        OrderStatus::CanceledByDriver,
    ];

    /// Returns true if `target` is reachable from this status in one step.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, target),
            (Pending, AcceptedByMerchant)
                | (Pending, RejectedByMerchant)
                | (AcceptedByMerchant, InPreparation)
                | (AcceptedByMerchant, CanceledByMerchant)
                | (InPreparation, ReadyToDeliver)
                | (InPreparation, CanceledByMerchant)
                | (ReadyToDeliver, CanceledByMerchant)
                | (ReadyToDeliver, AcceptedByDriver)
                | (AcceptedByDriver, OnTheWay)
                | (AcceptedByDriver, Completed)
                | (AcceptedByDriver, RejectedByDriver)
                | (OnTheWay, Completed)
                | (OnTheWay, CanceledByDriver)
        )
    }

    /// Who is allowed to move an order into this status. `None` for the
    /// initial status, which only checkout produces.
    pub fn step_owner(&self) -> Option<StepOwner> {
        use OrderStatus::*;

        match self {
            Pending => None,
            AcceptedByMerchant | InPreparation | ReadyToDeliver | RejectedByMerchant
            | CanceledByMerchant => Some(StepOwner::Merchant),
            AcceptedByDriver | OnTheWay | Completed | RejectedByDriver | CanceledByDriver => {
                Some(StepOwner::Driver)
            }
        }
    }

    /// Entering this status hands reserved stock back to inventory.
    pub fn releases_stock(&self) -> bool {
        matches!(
            self,
            OrderStatus::RejectedByMerchant | OrderStatus::CanceledByMerchant
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::RejectedByMerchant
                | OrderStatus::RejectedByDriver
                | OrderStatus::CanceledByMerchant
                | OrderStatus::CanceledByDriver
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::AcceptedByMerchant => "ACCEPTED_BY_MERCHANT",
            OrderStatus::InPreparation => "IN_PREPARATION",
            OrderStatus::ReadyToDeliver => "READY_TO_DELIVER",
            OrderStatus::AcceptedByDriver => "ACCEPTED_BY_DRIVER",
            OrderStatus::OnTheWay => "ON_THE_WAY",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::RejectedByMerchant => "REJECTED_BY_MERCHANT",
            OrderStatus::RejectedByDriver => "REJECTED_BY_DRIVER",
            OrderStatus::CanceledByMerchant => "CANCELED_BY_MERCHANT",
            OrderStatus::CanceledByDriver => "CANCELED_BY_DRIVER",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}
