//! Wallets, their ledger and withdrawals.

mod aggregate;
mod events;
mod service;
mod value_objects;

pub use aggregate::Wallet;
pub use events::{
    WalletEvent, WalletOpenedData, WithdrawalPendingData, WithdrawalRequestedData,
    WithdrawalSettledData,
};
pub use service::{CreditOutcome, WalletService};
pub use value_objects::{
    Credit, PayoutOutcome, Transaction, TransactionId, TransactionKind, TransactionStatus,
    WalletOwner, Withdrawal, WithdrawalId, WithdrawalStatus, earnings_key, refund_key,
    withdrawal_key,
};

use thiserror::Error;

use crate::values::Money;

/// Errors that can occur during wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: Money },

    #[error("Insufficient balance: requested {requested}, available {balance}")]
    InsufficientBalance { balance: Money, requested: Money },

    #[error("Withdrawal {withdrawal_id} is still open")]
    DuplicatePendingWithdrawal { withdrawal_id: WithdrawalId },

    #[error("Withdrawal {withdrawal_id} not found")]
    WithdrawalNotFound { withdrawal_id: WithdrawalId },

    #[error("Withdrawal {withdrawal_id} cannot change from {status}")]
    InvalidWithdrawalState {
        withdrawal_id: WithdrawalId,
        status: WithdrawalStatus,
    },

    #[error("Payout phone number is required")]
    MissingPayoutPhone,

    #[error("Payout reference is required")]
    MissingPayoutReference,

    #[error("Wallet belongs to a different owner")]
    OwnerMismatch,

    #[error("Wallet has not been opened")]
    NotOpened,
}
