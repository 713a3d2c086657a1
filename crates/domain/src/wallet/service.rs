//! Service for wallet credits and withdrawals.

use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::retry::{DEFAULT_MAX_ATTEMPTS, retry_on_conflict};
use crate::values::Money;

use super::{
    Credit, PayoutOutcome, Transaction, Wallet, WalletEvent, WalletOwner, Withdrawal,
    WithdrawalId,
};

/// A credit as recorded on the ledger.
#[derive(Debug, Clone)]
pub struct CreditOutcome {
    pub transaction: Transaction,
    /// True if the idempotency key had already been recorded and nothing
    /// was written.
    pub replayed: bool,
    pub balance: Money,
}

/// Wallet operations, each retried on commit conflicts.
pub struct WalletService<S: EventStore> {
    handler: CommandHandler<S, Wallet>,
    currency: String,
    max_attempts: u32,
}

impl<S: EventStore> WalletService<S> {
    pub fn new(store: S, currency: impl Into<String>) -> Self {
        Self {
            handler: CommandHandler::new(store),
            currency: currency.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn handler(&self) -> &CommandHandler<S, Wallet> {
        &self.handler
    }

    /// Currency of wallets opened by this service.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_wallet(&self, owner: WalletOwner) -> Result<Option<Wallet>, DomainError> {
        self.handler.load_existing(owner.wallet_id()).await
    }

    /// Credits `owner`'s wallet, opening it on first use.
    ///
    /// A repeated idempotency key returns the transaction recorded the first
    /// time.
    #[tracing::instrument(skip(self, credit), fields(amount = %credit.amount))]
    pub async fn credit(
        &self,
        owner: WalletOwner,
        credit: Credit,
    ) -> Result<CreditOutcome, DomainError> {
        let key = credit.idempotency_key.clone();
        let result = retry_on_conflict(self.max_attempts, |_| {
            let credit = credit.clone();
            let currency = self.currency.clone();
            self.handler
                .execute_with_snapshot(owner.wallet_id(), move |wallet| {
                    wallet.credit(owner, &currency, credit)
                })
        })
        .await?;

        let replayed = result.events.is_empty();
        let transaction = recorded_transaction(&result.events)
            .or_else(|| {
                key.as_deref()
                    .and_then(|k| result.aggregate.transaction_for_key(k))
                    .cloned()
            })
            .ok_or_else(|| DomainError::not_found("Transaction", key.unwrap_or_default()))?;

        if replayed {
            tracing::info!(%owner, transaction_id = %transaction.id, "credit already recorded");
        }
        Ok(CreditOutcome {
            transaction,
            replayed,
            balance: result.aggregate.balance(),
        })
    }

    /// Opens a withdrawal and debits its amount.
    ///
    /// Two concurrent requests race on the wallet version; the loser is
    /// retried against the new state and refused as a duplicate.
    #[tracing::instrument(skip(self, payout_phone))]
    pub async fn request_withdrawal(
        &self,
        owner: WalletOwner,
        amount: Money,
        payout_phone: &str,
    ) -> Result<Withdrawal, DomainError> {
        let withdrawal_id = WithdrawalId::new();
        let result = retry_on_conflict(self.max_attempts, |_| {
            let payout_phone = payout_phone.to_string();
            self.handler
                .execute_with_snapshot(owner.wallet_id(), move |wallet| {
                    wallet.request_withdrawal(withdrawal_id, amount, &payout_phone)
                })
        })
        .await?;

        metrics::counter!("withdrawals_requested_total").increment(1);
        tracing::info!(%owner, %withdrawal_id, %amount, "withdrawal requested");
        withdrawal_of(&result, withdrawal_id)
    }

    /// Records the payout provider's reference for a withdrawal.
    #[tracing::instrument(skip(self))]
    pub async fn mark_withdrawal_pending(
        &self,
        owner: WalletOwner,
        withdrawal_id: WithdrawalId,
        payout_reference: &str,
    ) -> Result<Withdrawal, DomainError> {
        self.require(owner).await?;
        let result = retry_on_conflict(self.max_attempts, |_| {
            let payout_reference = payout_reference.to_string();
            self.handler
                .execute_with_snapshot(owner.wallet_id(), move |wallet| {
                    wallet.mark_withdrawal_pending(withdrawal_id, &payout_reference)
                })
        })
        .await?;
        withdrawal_of(&result, withdrawal_id)
    }

    /// Closes a withdrawal with the payout outcome.
    #[tracing::instrument(skip(self))]
    pub async fn settle_withdrawal(
        &self,
        owner: WalletOwner,
        withdrawal_id: WithdrawalId,
        outcome: PayoutOutcome,
    ) -> Result<Withdrawal, DomainError> {
        self.require(owner).await?;
        let result = retry_on_conflict(self.max_attempts, |_| {
            let outcome = outcome.clone();
            self.handler
                .execute_with_snapshot(owner.wallet_id(), move |wallet| {
                    wallet.settle_withdrawal(withdrawal_id, outcome)
                })
        })
        .await?;

        if let PayoutOutcome::Failed { reason } = &outcome {
            tracing::warn!(%owner, %withdrawal_id, %reason, "payout failed, amount refunded");
        }
        withdrawal_of(&result, withdrawal_id)
    }

    async fn require(&self, owner: WalletOwner) -> Result<(), DomainError> {
        match self.get_wallet(owner).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::not_found("Wallet", owner)),
        }
    }
}

impl<S: EventStore + Clone> Clone for WalletService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            currency: self.currency.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

fn recorded_transaction(events: &[WalletEvent]) -> Option<Transaction> {
    events.iter().rev().find_map(|event| match event {
        WalletEvent::TransactionRecorded(txn) => Some(txn.clone()),
        _ => None,
    })
}

fn withdrawal_of(
    result: &CommandResult<Wallet>,
    withdrawal_id: WithdrawalId,
) -> Result<Withdrawal, DomainError> {
    result
        .aggregate
        .withdrawal(withdrawal_id)
        .cloned()
        .ok_or_else(|| DomainError::not_found("Withdrawal", withdrawal_id))
}
