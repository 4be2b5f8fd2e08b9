//! Wallet operations: lazy creation with signup bonus, bonus-first debits
//! for bids, and top-up credits.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::TariffConfig;
use crate::models::{
    split_debit, BidDebitParams, BidDebitResult, NewWalletTransaction, TxSource, TxType, Wallet,
};
use crate::services::metrics::{record_charge_amount, record_wallet_debit};
use crate::services::Database;

/// Get the owner's wallet, creating it on first use.
///
/// A newly created wallet is seeded with the one-time signup bonus and the
/// matching ledger entry. Two requests racing to create the same wallet
/// converge on one row: the loser of the unique-key race re-reads.
#[instrument(skip(db, tariff), fields(owner_id = %owner_id))]
pub async fn ensure_wallet(
    db: &Database,
    tariff: &TariffConfig,
    owner_id: Uuid,
) -> Result<Wallet, AppError> {
    if let Some(wallet) = db.get_wallet_by_owner(owner_id).await? {
        return Ok(wallet);
    }

    match db
        .create_wallet(owner_id, tariff.signup_bonus, &tariff.currency)
        .await?
    {
        Some(wallet) => Ok(wallet),
        // Another request created it between our read and insert.
        None => db
            .get_wallet_by_owner(owner_id)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Wallet for {} vanished after duplicate-key race",
                    owner_id
                ))
            }),
    }
}

/// Debit a contractor's wallet for a bid over an existing connection.
///
/// The availability check is a fast path; the conditional update with both
/// floor guards is what actually protects the balance under concurrent
/// debits. A lost race is reported with the freshest balances and never
/// retried. The ledger entry is appended on the same connection, so a
/// caller-supplied transaction commits or rolls back the debit and the
/// ledger together with its own side effects.
pub async fn debit_for_bid(
    db: &Database,
    tariff: &TariffConfig,
    params: &BidDebitParams,
    conn: &mut PgConnection,
) -> Result<BidDebitResult, AppError> {
    let cost = tariff.bid_cost;
    let wallet = ensure_wallet(db, tariff, params.contractor_id).await?;

    let Some((from_bonus, from_balance)) = split_debit(wallet.balance, wallet.bonus_balance, cost)
    else {
        record_wallet_debit(TxSource::Bid.as_str(), "insufficient_funds");
        return Ok(BidDebitResult::insufficient(cost, wallet.available()));
    };

    let debited = db
        .try_debit_wallet(&mut *conn, wallet.wallet_id, from_bonus, from_balance)
        .await?;
    let Some(debited) = debited else {
        // A concurrent debit won; report the latest known balances.
        let latest = db
            .get_wallet_on(&mut *conn, wallet.wallet_id)
            .await?
            .map(|w| w.available())
            .unwrap_or(Decimal::ZERO);
        record_wallet_debit(TxSource::Bid.as_str(), "insufficient_funds");
        return Ok(BidDebitResult::insufficient(cost, latest));
    };

    db.insert_wallet_transaction(
        &mut *conn,
        &NewWalletTransaction {
            wallet_id: wallet.wallet_id,
            amount: cost,
            tx_type: TxType::Debit,
            source: TxSource::Bid,
            balance_after: debited.balance,
            bonus_balance_after: debited.bonus_balance,
            meta: Some(serde_json::json!({
                "task_id": params.task_id,
                "application_id": params.application_id,
            })),
        },
    )
    .await?;

    record_wallet_debit(TxSource::Bid.as_str(), "charged");
    record_charge_amount(
        &tariff.currency,
        TxSource::Bid.as_str(),
        cost.to_f64().unwrap_or(0.0),
    );
    info!(
        contractor_id = %params.contractor_id,
        task_id = %params.task_id,
        from_bonus = %from_bonus,
        from_balance = %from_balance,
        "Bid charged"
    );

    Ok(BidDebitResult::charged(
        cost,
        from_bonus,
        from_balance,
        &debited,
    ))
}

/// Transactional wrapper around [`debit_for_bid`]: the debit and its
/// ledger entry commit as a unit, or not at all.
#[instrument(skip(db, tariff), fields(contractor_id = %params.contractor_id, task_id = %params.task_id))]
pub async fn charge_bid(
    db: &Database,
    tariff: &TariffConfig,
    params: &BidDebitParams,
) -> Result<BidDebitResult, AppError> {
    let mut tx = db.pool().begin().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
    })?;

    let result = debit_for_bid(db, tariff, params, &mut *tx).await?;


    if result.ok {
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;
    } else {
        tx.rollback().await.ok();
    }

    Ok(result)
}

/// Credit a wallet's real balance (top-ups, refunds from support).
#[instrument(skip(db, tariff), fields(owner_id = %owner_id, amount = %amount))]
pub async fn credit_wallet(
    db: &Database,
    tariff: &TariffConfig,
    owner_id: Uuid,
    amount: Decimal,
    source: TxSource,
    meta: Option<serde_json::Value>,
) -> Result<Wallet, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Credit amount must be positive, got {}",
            amount
        )));
    }

    let wallet = ensure_wallet(db, tariff, owner_id).await?;

    let mut tx = db.pool().begin().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
    })?;

    let credited = db
        .credit_wallet_balance(&mut *tx, wallet.wallet_id, amount)
        .await?
        .ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Wallet {} disappeared", wallet.wallet_id))
        })?;

    db.insert_wallet_transaction(
        &mut *tx,
        &NewWalletTransaction {
            wallet_id: wallet.wallet_id,
            amount,
            tx_type: TxType::Credit,
            source,
            balance_after: credited.balance,
            bonus_balance_after: credited.bonus_balance,
            meta,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
    })?;

    info!(wallet_id = %wallet.wallet_id, amount = %amount, source = %source, "Wallet credited");

    Ok(credited)
}
