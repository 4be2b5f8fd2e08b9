//! Storage metering endpoints: byte tracking, the write gate and the
//! hourly charge trigger.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{StorageBytesRequest, StorageChargeRequest};
use crate::models::{HourlyChargeOutcome, StorageGate, StorageUsage};
use crate::services::storage;
use crate::startup::AppState;

/// Writability gate. Upload handlers call this before accepting bytes;
/// `ok: false` carries the payment-required reason and a usage snapshot.
pub async fn check_access(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<StorageGate>, AppError> {
    let gate =
        storage::assert_writable_storage(&state.db, &state.config.tariff, org_id, Utc::now())
            .await?;
    Ok(Json(gate))
}

/// Record uploaded bytes, or apply a signed correction when `adjust` is
/// set.
pub async fn record_bytes(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<StorageBytesRequest>,
) -> Result<Json<StorageUsage>, AppError> {
    payload.validate()?;

    tracing::info!(
        org_id = %org_id,
        delta = payload.delta,
        adjust = payload.adjust,
        "Recording storage bytes"
    );

    let usage = if payload.adjust {
        storage::adjust_storage_bytes(&state.db, org_id, payload.delta).await?
    } else {
        storage::record_storage_bytes(&state.db, org_id, payload.delta).await?
    };

    Ok(Json(usage))
}

/// Run the hourly overage charge for one organization. Invoked by the
/// external scheduler; idempotent per UTC hour.
pub async fn charge_hourly(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    payload: Option<Json<StorageChargeRequest>>,
) -> Result<Json<HourlyChargeOutcome>, AppError> {
    let now = payload.and_then(|Json(p)| p.now);

    let outcome =
        storage::charge_hourly_overage_for_org(&state.db, &state.config.tariff, org_id, now)
            .await?;

    Ok(Json(outcome))
}
