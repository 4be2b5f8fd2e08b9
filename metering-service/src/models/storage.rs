//! Storage usage, overage billing records and access snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const BYTES_PER_GB: i64 = 1024 * 1024 * 1024;

/// Per-organization storage usage row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StorageUsage {
    pub org_id: Uuid,
    pub bytes_used: i64,
    pub read_only: bool,
    pub read_only_reason: Option<String>,
    pub updated_utc: DateTime<Utc>,
}

/// Append-only record of one charged hour.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StorageBillingRecord {
    pub billing_id: Uuid,
    pub org_id: Uuid,
    pub period: String,
    pub hour_key: String,
    pub bytes_snapshot: i64,
    pub gb_billed: i32,
    pub amount: Decimal,
    pub charged_utc: DateTime<Utc>,
}

/// Snapshot of an organization's storage standing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageAccess {
    pub bytes_used: i64,
    pub overage_gb: i64,
    pub hourly_charge: Decimal,
    pub wallet_balance: Decimal,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_reason: Option<String>,
}

/// Result of the writability gate checked before accepting new bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageGate {
    pub ok: bool,
    pub access: StorageAccess,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one hourly charge attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyChargeOutcome {
    pub ok: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HourlyChargeOutcome {
    pub fn charged() -> Self {
        Self {
            ok: true,
            skipped: false,
            reason: None,
        }
    }

    pub fn skipped(reason: &str) -> Self {
        Self {
            ok: true,
            skipped: true,
            reason: Some(reason.to_string()),
        }
    }

    pub fn insufficient_funds() -> Self {
        Self {
            ok: false,
            skipped: true,
            reason: Some("insufficient_funds".to_string()),
        }
    }
}

/// Idempotency key for hourly charges: one per org per UTC hour.
pub fn hour_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d-%H").to_string()
}
