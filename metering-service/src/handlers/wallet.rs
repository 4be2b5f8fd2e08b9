//! Wallet endpoints: ensure-on-read, bid charges, top-up credits and the
//! ledger listing.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{BidChargeRequest, CreditRequest};
use crate::models::{BidDebitParams, BidDebitResult, TxSource, Wallet, WalletTransaction};
use crate::services::wallet;
use crate::startup::AppState;

/// Get the owner's wallet, creating it (with the signup bonus) on first
/// access.
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<Wallet>, AppError> {
    let wallet = wallet::ensure_wallet(&state.db, &state.config.tariff, owner_id).await?;
    Ok(Json(wallet))
}

/// Charge the contractor for submitting a bid. `ok: false` means
/// insufficient funds and leaves the wallet untouched.
pub async fn charge_bid(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    Json(payload): Json<BidChargeRequest>,
) -> Result<Json<BidDebitResult>, AppError> {
    payload.validate()?;

    tracing::info!(
        contractor_id = %owner_id,
        task_id = %payload.task_id,
        "Charging bid"
    );

    let params = BidDebitParams {
        contractor_id: owner_id,
        task_id: payload.task_id,
        application_id: payload.application_id,
    };
    let result = wallet::charge_bid(&state.db, &state.config.tariff, &params).await?;

    Ok(Json(result))
}

/// Top up the owner's real balance.
pub async fn credit(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    Json(payload): Json<CreditRequest>,
) -> Result<Json<Wallet>, AppError> {
    payload.validate()?;

    let wallet = wallet::credit_wallet(
        &state.db,
        &state.config.tariff,
        owner_id,
        payload.amount,
        TxSource::TopUp,
        payload.meta,
    )
    .await?;

    Ok(Json(wallet))
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    #[serde(default = "default_page_size")]
    pub page_size: i32,
}

fn default_page_size() -> i32 {
    50
}

/// List the wallet's ledger, most recent first.
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<Vec<WalletTransaction>>, AppError> {
    let wallet = wallet::ensure_wallet(&state.db, &state.config.tariff, owner_id).await?;
    let transactions = state
        .db
        .list_wallet_transactions(wallet.wallet_id, query.page_size)
        .await?;
    Ok(Json(transactions))
}
