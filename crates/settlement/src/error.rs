//! Settlement error types.

use common::{AggregateId, DriverId};
use domain::{DomainError, InventoryError, OrderError, WalletError};
use event_store::EventStoreError;
use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failure, shared by every caller-facing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidTransition,
    InvalidCode,
    InsufficientStock,
    InsufficientBalance,
    DuplicatePendingWithdrawal,
    NotPermitted,
    /// Commit retries were exhausted.
    Conflict,
    Internal,
    /// A collaborator was slow or down and a local fallback was used. Only
    /// ever logged.
    ExternalServiceDegraded,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::InvalidCode => "invalid_code",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::DuplicatePendingWithdrawal => "duplicate_pending_withdrawal",
            ErrorKind::NotPermitted => "not_permitted",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
            ErrorKind::ExternalServiceDegraded => "external_service_degraded",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while settling orders.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The request was rejected before anything was written.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    OrderNotFound(AggregateId),

    #[error("Merchant not found: {0}")]
    MerchantNotFound(String),

    #[error("Driver {driver_id} is not approved")]
    DriverNotApproved { driver_id: DriverId },

    /// A directory or notification service failed.
    #[error("{service} failed: {reason}")]
    Collaborator {
        service: &'static str,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl SettlementError {
    pub fn validation(reason: impl Into<String>) -> Self {
        SettlementError::Validation(reason.into())
    }

    pub fn collaborator(service: &'static str, reason: impl ToString) -> Self {
        SettlementError::Collaborator {
            service,
            reason: reason.to_string(),
        }
    }

    /// Returns true if the unit of work lost a commit race and may be retried.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SettlementError::Domain(e) if e.is_conflict())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Validation(_) => ErrorKind::Validation,
            SettlementError::OrderNotFound(_) | SettlementError::MerchantNotFound(_) => {
                ErrorKind::NotFound
            }
            SettlementError::DriverNotApproved { .. } => ErrorKind::NotPermitted,
            SettlementError::Collaborator { .. } | SettlementError::Configuration(_) => {
                ErrorKind::Internal
            }
            SettlementError::Domain(e) => domain_kind(e),
        }
    }
}

impl From<OrderError> for SettlementError {
    fn from(e: OrderError) -> Self {
        SettlementError::Domain(e.into())
    }
}

impl From<InventoryError> for SettlementError {
    fn from(e: InventoryError) -> Self {
        SettlementError::Domain(e.into())
    }
}

impl From<WalletError> for SettlementError {
    fn from(e: WalletError) -> Self {
        SettlementError::Domain(e.into())
    }
}

impl From<EventStoreError> for SettlementError {
    fn from(e: EventStoreError) -> Self {
        SettlementError::Domain(e.into())
    }
}

impl domain::Retryable for SettlementError {
    fn is_conflict(&self) -> bool {
        SettlementError::is_conflict(self)
    }
}

fn domain_kind(error: &DomainError) -> ErrorKind {
    match error {
        DomainError::Order(e) => match e {
            OrderError::InvalidTransition { .. } | OrderError::AlreadyPlaced => {
                ErrorKind::InvalidTransition
            }
            OrderError::NotPlaced => ErrorKind::NotFound,
            OrderError::NotPermitted { .. } => ErrorKind::NotPermitted,
            OrderError::InvalidCode { .. } => ErrorKind::InvalidCode,
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::SubtotalMismatch { .. }
            | OrderError::InconsistentTotal { .. }
            | OrderError::AmountOverflow
            | OrderError::MissingContact
            | OrderError::InvalidCoordinates => ErrorKind::Validation,
        },
        DomainError::Inventory(e) => match e {
            InventoryError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            InventoryError::NotRegistered => ErrorKind::NotFound,
            InventoryError::AlreadyRegistered { .. } | InventoryError::AlreadyReserved { .. } => {
                ErrorKind::Conflict
            }
            InventoryError::MissingName
            | InventoryError::InvalidPrice { .. }
            | InventoryError::InvalidQuantity { .. }
            | InventoryError::StockOverflow { .. } => ErrorKind::Validation,
        },
        DomainError::Wallet(e) => match e {
            WalletError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            WalletError::DuplicatePendingWithdrawal { .. } => {
                ErrorKind::DuplicatePendingWithdrawal
            }
            WalletError::WithdrawalNotFound { .. } | WalletError::NotOpened => ErrorKind::NotFound,
            WalletError::InvalidWithdrawalState { .. } => ErrorKind::InvalidTransition,
            WalletError::InvalidAmount { .. }
            | WalletError::MissingPayoutPhone
            | WalletError::MissingPayoutReference => ErrorKind::Validation,
            WalletError::OwnerMismatch => ErrorKind::Internal,
        },
        DomainError::AggregateNotFound { .. } => ErrorKind::NotFound,
        DomainError::EventStore(e) if e.is_conflict() => ErrorKind::Conflict,
        DomainError::EventStore(_) | DomainError::Serialization(_) => ErrorKind::Internal,
    }
}

/// Convenience type alias for settlement results.
pub type Result<T> = std::result::Result<T, SettlementError>;
