//! Plan limit enforcement: atomically reserve one unit of a countable
//! resource for an organization in the current period.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    resolve_limits, LimitOverrides, PlanCode, PlanLimits, SlotOutcome, UsageKind,
};
use crate::services::metrics::record_usage_slot;
use crate::services::Database;

/// Resolve an organization's plan and effective limits.
///
/// Organizations without a subscription record are treated as Basic.
pub async fn resolve_org_limits(
    db: &Database,
    org_id: Uuid,
) -> Result<(PlanCode, PlanLimits), AppError> {
    let subscription = db.get_org_subscription(org_id).await?;
    let (plan, overrides) = match &subscription {
        Some(sub) => (sub.plan_code(), sub.overrides()),
        None => (PlanCode::Basic, LimitOverrides::default()),
    };
    let stored = db.get_plan_limit_config(plan).await?;

    Ok((plan, resolve_limits(plan, stored.as_ref(), &overrides)))
}

/// Atomically reserve one unit of `kind` for the organization, enforcing
/// the resolved plan limit.
///
/// The fast-path read avoids a write when the limit is already exhausted;
/// the actual reservation is a guarded increment so the limit holds under
/// concurrent requests from any number of server processes. A refused slot
/// is returned as a value; only infrastructure failures error.
#[instrument(skip(db), fields(org_id = %org_id, kind = %kind))]
pub async fn consume_usage_slot(
    db: &Database,
    org_id: Uuid,
    kind: UsageKind,
    now: DateTime<Utc>,
) -> Result<SlotOutcome, AppError> {
    let (plan, limits) = resolve_org_limits(db, org_id).await?;
    let limit = limits.for_kind(kind);
    let period = kind.period_for(now).key();

    // Fast path: no write when usage already meets the limit.
    if let Some(l) = limit {
        let used = db
            .get_usage_counter(org_id, &period)
            .await?
            .map(|c| c.count(kind))
            .unwrap_or(0);
        if used >= l {
            record_usage_slot(&org_id.to_string(), kind.as_str(), "limit_reached");
            return Ok(SlotOutcome::limit_reached(plan, l, used));
        }
    }

    if let Some(used) = db.try_increment_usage(org_id, &period, kind, limit).await? {
        record_usage_slot(&org_id.to_string(), kind.as_str(), "granted");
        info!(period = %period, used = used, "Usage slot reserved");
        return Ok(SlotOutcome::granted(plan, limit, used));
    }

    // No row matched: either the counter does not exist yet, or a
    // concurrent request pushed usage to the limit after the fast path.
    if db.get_usage_counter(org_id, &period).await?.is_none() {
        // First consumption this period. A zero limit was already refused
        // by the fast path above.
        if let Some(used) = db.insert_usage_counter(org_id, &period, kind).await? {
            record_usage_slot(&org_id.to_string(), kind.as_str(), "granted");
            info!(period = %period, used = used, "Usage counter created");
            return Ok(SlotOutcome::granted(plan, limit, used));
        }
        // Lost the creation race; retry once as a guarded increment
        // against the now-existing row.
        if let Some(used) = db.try_increment_usage(org_id, &period, kind, limit).await? {
            record_usage_slot(&org_id.to_string(), kind.as_str(), "granted");
            return Ok(SlotOutcome::granted(plan, limit, used));
        }
    }

    // The guarded increment refused: report the freshest count without
    // ever double-incrementing.
    let used = db
        .get_usage_counter(org_id, &period)
        .await?
        .map(|c| c.count(kind))
        .unwrap_or(0);
    record_usage_slot(&org_id.to_string(), kind.as_str(), "limit_reached");

    match limit {
        Some(l) => Ok(SlotOutcome::limit_reached(plan, l, used)),
        // Unlimited increments always match once the row exists.
        None => Ok(SlotOutcome::limit_reached(plan, used, used)),
    }
}
