//! Wallet aggregate: balance, ledger and withdrawals of one owner.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::values::Money;

use super::{
    Credit, PayoutOutcome, Transaction, TransactionId, TransactionKind, TransactionStatus,
    WalletError, WalletEvent, WalletOwner, Withdrawal, WithdrawalId, WithdrawalStatus,
    events::{
        WalletOpenedData, WithdrawalPendingData, WithdrawalRequestedData, WithdrawalSettledData,
    },
    refund_key, withdrawal_key,
};

/// A wallet and its ledger.
///
/// The balance never goes negative and always equals the signed sum of the
/// completed transactions. A wallet has at most one open withdrawal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wallet {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    owner: Option<WalletOwner>,
    currency: String,
    balance: Money,
    transactions: Vec<Transaction>,
    withdrawals: Vec<Withdrawal>,
    /// Idempotency key -> transaction recorded under it.
    keys: HashMap<String, TransactionId>,
    opened_at: Option<DateTime<Utc>>,
}

impl Aggregate for Wallet {
    type Event = WalletEvent;
    type Error = WalletError;

    fn aggregate_type() -> &'static str {
        "Wallet"
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
            WalletEvent::WalletOpened(data) => {
                self.id = Some(data.wallet_id);
                self.owner = Some(data.owner);
                self.currency = data.currency;
                self.opened_at = Some(data.opened_at);
            }
            WalletEvent::TransactionRecorded(txn) => self.record(txn),
            WalletEvent::WithdrawalRequested(data) => {
                self.withdrawals.push(data.withdrawal);
                self.record(data.debit);
            }
            WalletEvent::WithdrawalPending(data) => {
                if let Some(w) = self.withdrawal_mut(data.withdrawal_id) {
                    w.status = WithdrawalStatus::Pending;
                    w.payout_reference = Some(data.payout_reference);
                }
            }
            WalletEvent::WithdrawalSettled(data) => self.apply_settled(data),
        }
    }
}

impl SnapshotCapable for Wallet {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Wallet {
    pub fn owner(&self) -> Option<WalletOwner> {
        self.owner
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn withdrawals(&self) -> &[Withdrawal] {
        &self.withdrawals
    }

    pub fn withdrawal(&self, id: WithdrawalId) -> Option<&Withdrawal> {
        self.withdrawals.iter().find(|w| w.id == id)
    }

    pub fn open_withdrawal(&self) -> Option<&Withdrawal> {
        self.withdrawals.iter().find(|w| w.status.is_open())
    }

    /// The transaction recorded under `key`, if any.
    pub fn transaction_for_key(&self, key: &str) -> Option<&Transaction> {
        let id = self.keys.get(key)?;
        self.transactions.iter().find(|t| t.id == *id)
    }

    /// Returns true if the balance equals the signed sum of the ledger.
    pub fn reconciles(&self) -> bool {
        let ledger: Money = self.transactions.iter().map(Transaction::signed_amount).sum();
        ledger == self.balance
    }
}

// Command methods (return events)
impl Wallet {
    /// Credits the wallet, opening it first if this is its first activity.
    ///
    /// A credit whose idempotency key was already recorded is a no-op; the
    /// original entry is available through
    /// [`transaction_for_key`](Self::transaction_for_key).
    pub fn credit(
        &self,
        owner: WalletOwner,
        currency: &str,
        credit: Credit,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        if !credit.amount.is_positive() {
            return Err(WalletError::InvalidAmount {
                amount: credit.amount,
            });
        }
        if let Some(key) = &credit.idempotency_key
            && self.keys.contains_key(key)
        {
            return Ok(vec![]);
        }
        self.check_owner(owner)?;

        let now = Utc::now();
        let wallet_id = owner.wallet_id();
        let mut events = self.open_if_needed(owner, currency, now);
        events.push(WalletEvent::TransactionRecorded(Transaction {
            id: TransactionId::new(),
            wallet_id,
            order_id: credit.order_id,
            amount: credit.amount,
            kind: TransactionKind::Credit,
            status: TransactionStatus::Completed,
            description: credit.description,
            idempotency_key: credit.idempotency_key,
            created_at: now,
        }));
        Ok(events)
    }

    /// Debits the wallet. The balance may not go below zero.
    pub fn debit(
        &self,
        amount: Money,
        description: impl Into<String>,
        idempotency_key: Option<String>,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount { amount });
        }
        if let Some(key) = &idempotency_key
            && self.keys.contains_key(key)
        {
            return Ok(vec![]);
        }
        let wallet_id = self.check_funds(amount)?;

        Ok(vec![WalletEvent::TransactionRecorded(Transaction {
            id: TransactionId::new(),
            wallet_id,
            order_id: None,
            amount,
            kind: TransactionKind::Debit,
            status: TransactionStatus::Completed,
            description: description.into(),
            idempotency_key,
            created_at: Utc::now(),
        })])
    }

    /// Opens a withdrawal and debits its amount in the same event.
    pub fn request_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        amount: Money,
        payout_phone: &str,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount { amount });
        }
        let payout_phone = payout_phone.trim();
        if payout_phone.is_empty() {
            return Err(WalletError::MissingPayoutPhone);
        }
        if let Some(open) = self.open_withdrawal() {
            return Err(WalletError::DuplicatePendingWithdrawal {
                withdrawal_id: open.id,
            });
        }
        let wallet_id = self.check_funds(amount)?;

        let now = Utc::now();
        let debit = Transaction {
            id: TransactionId::new(),
            wallet_id,
            order_id: None,
            amount,
            kind: TransactionKind::Debit,
            status: TransactionStatus::Completed,
            description: format!("Withdrawal {withdrawal_id}"),
            idempotency_key: Some(withdrawal_key(withdrawal_id)),
            created_at: now,
        };
        let withdrawal = Withdrawal {
            id: withdrawal_id,
            amount,
            payout_phone: payout_phone.to_string(),
            status: WithdrawalStatus::Initialization,
            payout_reference: None,
            failure_reason: None,
            debit_transaction_id: debit.id,
            requested_at: now,
            settled_at: None,
        };

        Ok(vec![WalletEvent::WithdrawalRequested(
            WithdrawalRequestedData { withdrawal, debit },
        )])
    }

    /// Records that the payout provider accepted the withdrawal.
    pub fn mark_withdrawal_pending(
        &self,
        withdrawal_id: WithdrawalId,
        payout_reference: &str,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        let withdrawal = self.require_withdrawal(withdrawal_id)?;
        if withdrawal.status != WithdrawalStatus::Initialization {
            return Err(WalletError::InvalidWithdrawalState {
                withdrawal_id,
                status: withdrawal.status,
            });
        }
        if payout_reference.trim().is_empty() {
            return Err(WalletError::MissingPayoutReference);
        }

        Ok(vec![WalletEvent::WithdrawalPending(WithdrawalPendingData {
            withdrawal_id,
            payout_reference: payout_reference.trim().to_string(),
        })])
    }

    /// Closes a withdrawal. A failed payout refunds the debited amount.
    ///
    /// Success is only possible once the payout is pending; failure may be
    /// reported at any point while the withdrawal is open.
    pub fn settle_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        outcome: PayoutOutcome,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        let withdrawal = self.require_withdrawal(withdrawal_id)?;
        let allowed = match outcome {
            PayoutOutcome::Succeeded => withdrawal.status == WithdrawalStatus::Pending,
            PayoutOutcome::Failed { .. } => withdrawal.status.is_open(),
        };
        if !allowed {
            return Err(WalletError::InvalidWithdrawalState {
                withdrawal_id,
                status: withdrawal.status,
            });
        }

        let wallet_id = self.id.ok_or(WalletError::NotOpened)?;
        let now = Utc::now();
        let refund = match &outcome {
            PayoutOutcome::Succeeded => None,
            PayoutOutcome::Failed { reason } => Some(Transaction {
                id: TransactionId::new(),
                wallet_id,
                order_id: None,
                amount: withdrawal.amount,
                kind: TransactionKind::Credit,
                status: TransactionStatus::Completed,
                description: format!("Refund of withdrawal {withdrawal_id}: {reason}"),
                idempotency_key: Some(refund_key(withdrawal_id)),
                created_at: now,
            }),
        };

        Ok(vec![WalletEvent::WithdrawalSettled(WithdrawalSettledData {
            withdrawal_id,
            outcome,
            refund,
            settled_at: now,
        })])
    }

    fn open_if_needed(
        &self,
        owner: WalletOwner,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Vec<WalletEvent> {
        if self.id.is_some() {
            return vec![];
        }
        vec![WalletEvent::WalletOpened(WalletOpenedData {
            wallet_id: owner.wallet_id(),
            owner,
            currency: currency.to_string(),
            opened_at: now,
        })]
    }

    fn check_owner(&self, owner: WalletOwner) -> Result<(), WalletError> {
        match self.owner {
            Some(existing) if existing != owner => Err(WalletError::OwnerMismatch),
            _ => Ok(()),
        }
    }

    fn check_funds(&self, amount: Money) -> Result<AggregateId, WalletError> {
        match self.id {
            Some(wallet_id) if self.balance >= amount => Ok(wallet_id),
            _ => Err(WalletError::InsufficientBalance {
                balance: self.balance,
                requested: amount,
            }),
        }
    }

    fn require_withdrawal(&self, withdrawal_id: WithdrawalId) -> Result<&Withdrawal, WalletError> {
        self.withdrawal(withdrawal_id)
            .ok_or(WalletError::WithdrawalNotFound { withdrawal_id })
    }
}

// Apply event helpers
impl Wallet {
    fn record(&mut self, txn: Transaction) {
        self.balance += txn.signed_amount();
        if let Some(key) = &txn.idempotency_key {
            self.keys.insert(key.clone(), txn.id);
        }
        self.transactions.push(txn);
    }

    fn withdrawal_mut(&mut self, id: WithdrawalId) -> Option<&mut Withdrawal> {
        self.withdrawals.iter_mut().find(|w| w.id == id)
    }

    fn apply_settled(&mut self, data: WithdrawalSettledData) {
        if let Some(w) = self.withdrawal_mut(data.withdrawal_id) {
            w.settled_at = Some(data.settled_at);
            match &data.outcome {
                PayoutOutcome::Succeeded => w.status = WithdrawalStatus::Completed,
                PayoutOutcome::Failed { reason } => {
                    w.status = WithdrawalStatus::Failed;
                    w.failure_reason = Some(reason.clone());
                }
            }
        }
        if let Some(refund) = data.refund {
            self.record(refund);
        }
    }
}
