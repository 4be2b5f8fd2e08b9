//! Storage metering: byte tracking, overage computation, write gating and
//! the idempotent hourly overage charge.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::TariffConfig;
use crate::models::{
    hour_key, hours_in_utc_month, split_debit, HourlyChargeOutcome, NewWalletTransaction, Period,
    StorageAccess, StorageGate, StorageUsage, TxSource, TxType, BYTES_PER_GB,
};
use crate::services::metrics::{record_charge_amount, record_storage_charge};
use crate::services::Database;

const READ_ONLY_REASON: &str = "Недостаточно средств для оплаты хранения";

/// Whole GB of overage above the free allowance, rounded up.
pub fn overage_gb(bytes_used: i64, free_allowance_gb: i64) -> i64 {
    let over = (bytes_used - free_allowance_gb * BYTES_PER_GB).max(0);
    (over + BYTES_PER_GB - 1) / BYTES_PER_GB
}

/// Charge for one hour of overage: the monthly per-GB rate amortized over
/// the actual hour count of the UTC month containing `now`.
pub fn hourly_charge(overage_gb: i64, monthly_rate_per_gb: Decimal, now: DateTime<Utc>) -> Decimal {
    if overage_gb <= 0 {
        return Decimal::ZERO;
    }
    Decimal::from(overage_gb) * monthly_rate_per_gb / Decimal::from(hours_in_utc_month(now))
}

/// Record non-negative bytes consumed by an upload.
#[instrument(skip(db), fields(org_id = %org_id, bytes = bytes_delta))]
pub async fn record_storage_bytes(
    db: &Database,
    org_id: Uuid,
    bytes_delta: i64,
) -> Result<StorageUsage, AppError> {
    if bytes_delta < 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "bytes_delta must be non-negative, got {}",
            bytes_delta
        )));
    }
    db.add_storage_bytes(org_id, bytes_delta).await
}

/// Apply a signed correction (deletions, recounts). The stored total is
/// clamped at zero.
#[instrument(skip(db), fields(org_id = %org_id, bytes = bytes_delta))]
pub async fn adjust_storage_bytes(
    db: &Database,
    org_id: Uuid,
    bytes_delta: i64,
) -> Result<StorageUsage, AppError> {
    db.add_storage_bytes(org_id, bytes_delta).await
}

/// Snapshot of an organization's storage standing: bytes, overage, the
/// hourly charge it implies and the wallet balance available to cover it.
pub async fn storage_access(
    db: &Database,
    tariff: &TariffConfig,
    org_id: Uuid,
    now: DateTime<Utc>,
) -> Result<StorageAccess, AppError> {
    let usage = db.get_storage_usage(org_id).await?;
    let (bytes_used, read_only, read_only_reason) = match usage {
        Some(u) => (u.bytes_used, u.read_only, u.read_only_reason),
        None => (0, false, None),
    };

    let gb = overage_gb(bytes_used, tariff.free_allowance_gb);
    let charge = hourly_charge(gb, tariff.monthly_rate_per_gb, now);

    let wallet_balance = db
        .get_wallet_by_owner(org_id)
        .await?
        .map(|w| w.available())
        .unwrap_or(Decimal::ZERO);

    Ok(StorageAccess {
        bytes_used,
        overage_gb: gb,
        hourly_charge: charge,
        wallet_balance,
        read_only,
        read_only_reason,
    })
}

/// Gate checked by upload handlers before accepting new bytes.
///
/// Fails (and flips the organization read-only) when there is unpaid
/// overage the wallet cannot cover for even one hour; clears a stale
/// read-only flag once the wallet covers the charge again.
#[instrument(skip(db, tariff), fields(org_id = %org_id))]
pub async fn assert_writable_storage(
    db: &Database,
    tariff: &TariffConfig,
    org_id: Uuid,
    now: DateTime<Utc>,
) -> Result<StorageGate, AppError> {
    let mut access = storage_access(db, tariff, org_id, now).await?;

    if access.overage_gb > 0 && access.wallet_balance < access.hourly_charge {
        let usage = db
            .set_storage_read_only(org_id, true, Some(READ_ONLY_REASON))
            .await?;
        access.read_only = usage.read_only;
        access.read_only_reason = usage.read_only_reason;
        warn!(
            bytes_used = access.bytes_used,
            overage_gb = access.overage_gb,
            "Storage write refused, wallet cannot cover overage"
        );
        return Ok(StorageGate {
            ok: false,
            access,
            error: Some(READ_ONLY_REASON.to_string()),
        });
    }

    if access.read_only {
        let usage = db.set_storage_read_only(org_id, false, None).await?;
        access.read_only = usage.read_only;
        access.read_only_reason = usage.read_only_reason;
    }

    Ok(StorageGate {
        ok: true,
        access,
        error: None,
    })
}

/// Charge one hour of storage overage, at most once per organization per
/// UTC hour.
///
/// Safe to re-trigger from any number of schedulers: an existing billing
/// record for the hour is a no-op, and the debit, the billing record and
/// the read-only reset commit as a single transaction.
#[instrument(skip(db, tariff), fields(org_id = %org_id))]
pub async fn charge_hourly_overage_for_org(
    db: &Database,
    tariff: &TariffConfig,
    org_id: Uuid,
    now: Option<DateTime<Utc>>,
) -> Result<HourlyChargeOutcome, AppError> {
    let now = now.unwrap_or_else(Utc::now);
    let hk = hour_key(now);

    if db.get_storage_billing(org_id, &hk).await?.is_some() {
        record_storage_charge(&org_id.to_string(), "already_charged");
        return Ok(HourlyChargeOutcome::skipped("already_charged"));
    }

    // Recompute freshly; usage may have moved since the gate last ran.
    let bytes_used = db
        .get_storage_usage(org_id)
        .await?
        .map(|u| u.bytes_used)
        .unwrap_or(0);
    let gb = overage_gb(bytes_used, tariff.free_allowance_gb);

    if gb == 0 {
        db.set_storage_read_only(org_id, false, None).await?;
        record_storage_charge(&org_id.to_string(), "no_overage");
        return Ok(HourlyChargeOutcome::skipped("no_overage"));
    }

    let charge = hourly_charge(gb, tariff.monthly_rate_per_gb, now);

    let wallet = match db.get_wallet_by_owner(org_id).await? {
        Some(w) => w,
        None => {
            db.set_storage_read_only(org_id, true, Some(READ_ONLY_REASON))
                .await?;
            record_storage_charge(&org_id.to_string(), "insufficient_funds");
            return Ok(HourlyChargeOutcome::insufficient_funds());
        }
    };

    let Some((from_bonus, from_balance)) =
        split_debit(wallet.balance, wallet.bonus_balance, charge)
    else {
        db.set_storage_read_only(org_id, true, Some(READ_ONLY_REASON))
            .await?;
        record_storage_charge(&org_id.to_string(), "insufficient_funds");
        return Ok(HourlyChargeOutcome::insufficient_funds());
    };

    let mut tx = db.pool().begin().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
    })?;

    let debited = db
        .try_debit_wallet(&mut *tx, wallet.wallet_id, from_bonus, from_balance)
        .await?;

    let Some(debited) = debited else {
        // Lost a race against a concurrent debit; never retry a charge.
        tx.rollback().await.ok();
        db.set_storage_read_only(org_id, true, Some(READ_ONLY_REASON))
            .await?;
        record_storage_charge(&org_id.to_string(), "insufficient_funds");
        return Ok(HourlyChargeOutcome::insufficient_funds());
    };

    let period = Period::month_of(now).key();
    let billing = db
        .insert_storage_billing(&mut *tx, org_id, &period, &hk, bytes_used, gb as i32, charge)
        .await?;
    if billing.is_none() {
        // A concurrent scheduler charged this hour between our idempotency
        // check and the insert.
        tx.rollback().await.ok();
        record_storage_charge(&org_id.to_string(), "already_charged");
        return Ok(HourlyChargeOutcome::skipped("already_charged"));
    }

    db.insert_wallet_transaction(
        &mut *tx,
        &NewWalletTransaction {
            wallet_id: wallet.wallet_id,
            amount: charge,
            tx_type: TxType::Debit,
            source: TxSource::StorageOverage,
            balance_after: debited.balance,
            bonus_balance_after: debited.bonus_balance,
            meta: Some(serde_json::json!({
                "period": period,
                "hour_key": hk,
                "gb_billed": gb,
                "bytes_snapshot": bytes_used,
            })),
        },
    )
    .await?;

    db.set_storage_read_only_on(&mut *tx, org_id, false, None)
        .await?;

    tx.commit().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
    })?;

    record_storage_charge(&org_id.to_string(), "charged");
    record_charge_amount(
        &tariff.currency,
        TxSource::StorageOverage.as_str(),
        charge.to_f64().unwrap_or(0.0),
    );
    info!(
        hour_key = %hk,
        gb_billed = gb,
        amount = %charge,
        "Hourly storage overage charged"
    );

    Ok(HourlyChargeOutcome::charged())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn no_overage_within_free_allowance() {
        assert_eq!(overage_gb(0, 5), 0);
        assert_eq!(overage_gb(5 * BYTES_PER_GB, 5), 0);
    }

    #[test]
    fn one_byte_over_rounds_up_to_a_full_gb() {
        assert_eq!(overage_gb(5 * BYTES_PER_GB + 1, 5), 1);
    }

    #[test]
    fn six_gb_used_is_one_gb_over() {
        assert_eq!(overage_gb(6 * BYTES_PER_GB, 5), 1);
        assert_eq!(overage_gb(6 * BYTES_PER_GB + 1, 5), 2);
    }

    #[test]
    fn hourly_charge_amortizes_over_month_hours() {
        // January has 744 hours.
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 3, 0, 0).unwrap();
        assert_eq!(hourly_charge(1, dec!(50), now), dec!(50) / dec!(744));
        // February 2026 has 672.
        let feb = Utc.with_ymd_and_hms(2026, 2, 10, 3, 0, 0).unwrap();
        assert_eq!(hourly_charge(2, dec!(50), feb), dec!(100) / dec!(672));
    }

    #[test]
    fn zero_overage_charges_nothing() {
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 3, 0, 0).unwrap();
        assert_eq!(hourly_charge(0, dec!(50), now), Decimal::ZERO);
    }
}
