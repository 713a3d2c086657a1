//! Ledger value objects.

use chrono::{DateTime, Utc};
use common::{AggregateId, DriverId, MerchantId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::values::Money;

common::uuid_id! {
    /// Ledger entry identifier.
    TransactionId
}

common::uuid_id! {
    /// Withdrawal request identifier.
    WithdrawalId
}

/// Namespace for deriving wallet stream ids from their owners.
const WALLET_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a7e_93b4_4d0a_8c55_1e0b_7d2f_a341);

/// Who a wallet belongs to. Drivers hold user wallets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum WalletOwner {
    User(UserId),
    Merchant(MerchantId),
}

impl WalletOwner {
    pub fn driver(driver_id: DriverId) -> Self {
        WalletOwner::User(driver_id.into())
    }

    /// Stream id of this owner's wallet. The same owner always maps to the
    /// same wallet, so the wallet can be opened by its first credit.
    pub fn wallet_id(&self) -> AggregateId {
        let name = self.to_string();
        AggregateId::from_uuid(Uuid::new_v5(&WALLET_NAMESPACE, name.as_bytes()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WalletOwner::User(_) => "user",
            WalletOwner::Merchant(_) => "merchant",
        }
    }

    /// Builds an owner from its kind (`user`, `driver` or `merchant`) and id.
    pub fn parse(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "user" | "driver" => Some(WalletOwner::User(UserId::from_uuid(id))),
            "merchant" => Some(WalletOwner::Merchant(MerchantId::from_uuid(id))),
            _ => None,
        }
    }
}

impl std::fmt::Display for WalletOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletOwner::User(id) => write!(f, "user:{id}"),
            WalletOwner::Merchant(id) => write!(f, "merchant:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: AggregateId,
    pub order_id: Option<AggregateId>,
    /// Always positive; the direction is given by `kind`.
    pub amount: Money,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Effect on the balance if the entry is completed, zero otherwise.
    pub fn signed_amount(&self) -> Money {
        match (self.status, self.kind) {
            (TransactionStatus::Completed, TransactionKind::Credit) => self.amount,
            (TransactionStatus::Completed, TransactionKind::Debit) => Money::zero() - self.amount,
            _ => Money::zero(),
        }
    }
}

/// Request to credit a wallet.
#[derive(Debug, Clone)]
pub struct Credit {
    pub amount: Money,
    pub order_id: Option<AggregateId>,
    pub description: String,
    pub idempotency_key: Option<String>,
}

impl Credit {
    /// The driver's share of an order's delivery fee.
    pub fn delivery_earnings(order_id: AggregateId, amount: Money) -> Self {
        Self {
            amount,
            order_id: Some(order_id),
            description: format!("Delivery earnings for order {order_id}"),
            idempotency_key: Some(earnings_key(order_id)),
        }
    }
}

/// Idempotency key of the earnings credit for an order.
pub fn earnings_key(order_id: AggregateId) -> String {
    format!("{order_id}:earnings")
}

/// Idempotency key of the refund for a failed withdrawal.
pub fn refund_key(withdrawal_id: WithdrawalId) -> String {
    format!("{withdrawal_id}:refund")
}

/// Idempotency key of the debit backing a withdrawal.
pub fn withdrawal_key(withdrawal_id: WithdrawalId) -> String {
    format!("{withdrawal_id}:withdrawal")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Initialization,
    Pending,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    /// Still waiting for the payout to resolve.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Initialization | WithdrawalStatus::Pending
        )
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WithdrawalStatus::Initialization => "INITIALIZATION",
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Completed => "COMPLETED",
            WithdrawalStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub amount: Money,
    pub payout_phone: String,
    pub status: WithdrawalStatus,
    pub payout_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub debit_transaction_id: TransactionId,
    pub requested_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// How the external payout ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PayoutOutcome {
    Succeeded,
    Failed { reason: String },
}
