//! Wallet domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{PayoutOutcome, Transaction, Withdrawal, WithdrawalId, WalletOwner, withdrawal_key};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WalletEvent {
    /// First activity on the owner's wallet.
    WalletOpened(WalletOpenedData),

    /// A completed credit or debit.
    TransactionRecorded(Transaction),

    /// A withdrawal was requested and its amount debited.
    WithdrawalRequested(WithdrawalRequestedData),

    /// The payout provider accepted the withdrawal.
    WithdrawalPending(WithdrawalPendingData),

    /// The payout finished; a failed payout carries its refund.
    WithdrawalSettled(WithdrawalSettledData),
}

impl DomainEvent for WalletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::WalletOpened(_) => "WalletOpened",
            WalletEvent::TransactionRecorded(_) => "TransactionRecorded",
            WalletEvent::WithdrawalRequested(_) => "WithdrawalRequested",
            WalletEvent::WithdrawalPending(_) => "WithdrawalPending",
            WalletEvent::WithdrawalSettled(_) => "WithdrawalSettled",
        }
    }

    fn idempotency_key(&self) -> Option<String> {
        match self {
            WalletEvent::TransactionRecorded(txn) => txn.idempotency_key.clone(),
            WalletEvent::WithdrawalRequested(data) => Some(withdrawal_key(data.withdrawal.id)),
            WalletEvent::WithdrawalSettled(data) => {
                data.refund.as_ref().and_then(|r| r.idempotency_key.clone())
            }
            WalletEvent::WalletOpened(_) | WalletEvent::WithdrawalPending(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletOpenedData {
    pub wallet_id: AggregateId,
    pub owner: WalletOwner,
    pub currency: String,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequestedData {
    pub withdrawal: Withdrawal,
    pub debit: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalPendingData {
    pub withdrawal_id: WithdrawalId,
    pub payout_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalSettledData {
    pub withdrawal_id: WithdrawalId,
    pub outcome: PayoutOutcome,
    pub refund: Option<Transaction>,
    pub settled_at: DateTime<Utc>,
}
