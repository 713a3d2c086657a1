//! Wallet, ledger and withdrawal endpoints.
//!
//! Wallets are addressed by owner: `/wallets/{kind}/{id}` where `kind` is
//! `user`, `driver` or `merchant`. Drivers hold user wallets, so `driver`
//! and `user` name the same wallet.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{Money, PayoutOutcome, Transaction, Wallet, WalletOwner, Withdrawal, WithdrawalId};
use event_store::EventStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::{AppState, parse_id};

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Money,
    pub payout_phone: String,
}

#[derive(Debug, Deserialize)]
pub struct PendingRequest {
    pub payout_reference: String,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub owner: WalletOwner,
    pub currency: String,
    pub balance: Money,
    pub transactions: Vec<Transaction>,
    pub withdrawals: Vec<Withdrawal>,
}

impl WalletResponse {
    fn new(owner: WalletOwner, wallet: &Wallet) -> Self {
        Self {
            owner,
            currency: wallet.currency().to_string(),
            balance: wallet.balance(),
            transactions: wallet.transactions().to_vec(),
            withdrawals: wallet.withdrawals().to_vec(),
        }
    }
}

fn parse_owner(kind: &str, id: &str) -> Result<WalletOwner, ApiError> {
    let uuid: Uuid = parse_id(kind, id)?;
    WalletOwner::parse(kind, uuid)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown wallet owner kind '{kind}'")))
}

/// GET /wallets/{kind}/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<WalletResponse>, ApiError> {
    let owner = parse_owner(&kind, &id)?;
    let wallet = state.engine.get_wallet(owner).await?;
    Ok(Json(WalletResponse::new(owner, &wallet)))
}

/// POST /wallets/{kind}/{id}/withdrawals
#[tracing::instrument(skip(state, req), fields(amount = %req.amount))]
pub async fn request_withdrawal<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((kind, id)): Path<(String, String)>,
    Json(req): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<Withdrawal>), ApiError> {
    let owner = parse_owner(&kind, &id)?;
    let withdrawal = state
        .engine
        .request_withdrawal(owner, req.amount, &req.payout_phone)
        .await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// POST /wallets/{kind}/{id}/withdrawals/{wid}/pending: the payout was
/// handed to the provider.
#[tracing::instrument(skip(state, req))]
pub async fn mark_pending<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((kind, id, wid)): Path<(String, String, String)>,
    Json(req): Json<PendingRequest>,
) -> Result<Json<Withdrawal>, ApiError> {
    let owner = parse_owner(&kind, &id)?;
    let withdrawal_id: WithdrawalId = parse_id("withdrawal", &wid)?;
    let withdrawal = state
        .engine
        .mark_withdrawal_pending(owner, withdrawal_id, &req.payout_reference)
        .await?;
    Ok(Json(withdrawal))
}

/// POST /wallets/{kind}/{id}/withdrawals/{wid}/settle
#[tracing::instrument(skip(state, outcome))]
pub async fn settle<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((kind, id, wid)): Path<(String, String, String)>,
    Json(outcome): Json<PayoutOutcome>,
) -> Result<Json<Withdrawal>, ApiError> {
    let owner = parse_owner(&kind, &id)?;
    let withdrawal_id: WithdrawalId = parse_id("withdrawal", &wid)?;
    let withdrawal = state
        .engine
        .settle_withdrawal(owner, withdrawal_id, outcome)
        .await?;
    Ok(Json(withdrawal))
}
