//! Domain models for the metering service.

mod period;
mod plan;
mod storage;
mod usage;
mod wallet;

pub use period::{hours_in_utc_month, Period};
pub use plan::{
    resolve_limits, LimitOverrides, OrgSubscription, PlanCode, PlanLimitConfig, PlanLimits,
    UpsertOrgSubscription,
};
pub use storage::{
    hour_key, HourlyChargeOutcome, StorageAccess, StorageBillingRecord, StorageGate, StorageUsage,
    BYTES_PER_GB,
};
pub use usage::{SlotOutcome, UsageCounter, UsageKind};
pub use wallet::{
    split_debit, BidDebitParams, BidDebitResult, NewWalletTransaction, TxSource, TxType, Wallet,
    WalletTransaction,
};
