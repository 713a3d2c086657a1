//! Domain layer of the delivery marketplace.
//!
//! This crate provides:
//! - Aggregate trait for event-sourced entities and the CommandHandler that
//!   loads and persists them
//! - Order aggregate with the delivery state machine and verification codes
//! - Product aggregate holding stock and per-order reservations
//! - Wallet aggregate holding the ledger and withdrawals
//! - UnitOfWork for committing several streams atomically, and conflict retry

pub mod aggregate;
pub mod command;
pub mod error;
pub mod inventory;
pub mod order;
pub mod retry;
pub mod unit_of_work;
pub mod values;
pub mod wallet;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use command::{CommandHandler, CommandResult};
pub use error::DomainError;
pub use inventory::{InventoryError, InventoryService, Product, ProductEvent, Reservation};
pub use order::{
    Actor, CodeKind, Contact, DRIVER_EARNINGS_PERCENT, DeliveryInfo, LineItem, LocationSource,
    Order, OrderError, OrderEvent, OrderPrices, OrderService, OrderStatus, Payment, PaymentMethod,
    PaymentStatus, PlaceOrder, RouteLeg, StatusEntry, StepOwner, TransitionContext,
    VerificationCode,
};
pub use retry::{DEFAULT_MAX_ATTEMPTS, Retryable, retry_on_conflict};
pub use unit_of_work::UnitOfWork;
pub use values::{GeoPoint, Money};
pub use wallet::{
    Credit, CreditOutcome, PayoutOutcome, Transaction, TransactionId, TransactionKind, Wallet,
    WalletError, WalletEvent, WalletOwner, WalletService, Withdrawal, WithdrawalId,
    WithdrawalStatus, earnings_key,
};
