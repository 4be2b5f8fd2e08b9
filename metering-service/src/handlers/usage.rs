//! Usage slot consumption endpoint.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{SlotOutcome, UsageKind};
use crate::services::limits;
use crate::startup::AppState;

/// Reserve one unit of a countable resource for the organization.
///
/// A refused slot is a 200 with `ok: false`; the caller decides how to
/// surface the "upgrade your plan" message.
pub async fn consume_slot(
    State(state): State<AppState>,
    Path((org_id, kind)): Path<(Uuid, String)>,
) -> Result<Json<SlotOutcome>, AppError> {
    let kind = UsageKind::from_str(&kind)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown usage kind: {}", kind)))?;

    tracing::info!(org_id = %org_id, kind = %kind, "Consuming usage slot");

    let outcome = limits::consume_usage_slot(&state.db, org_id, kind, Utc::now()).await?;

    Ok(Json(outcome))
}
