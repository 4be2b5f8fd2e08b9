//! Subscription plans and limit resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::usage::UsageKind;

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCode {
    Basic,
    Pro,
    Business,
    Enterprise,
}

impl PlanCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCode::Basic => "basic",
            PlanCode::Pro => "pro",
            PlanCode::Business => "business",
            PlanCode::Enterprise => "enterprise",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pro" => PlanCode::Pro,
            "business" => PlanCode::Business,
            "enterprise" => PlanCode::Enterprise,
            _ => PlanCode::Basic,
        }
    }
}

impl std::fmt::Display for PlanCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved limits for one organization. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub seats: Option<i32>,
    pub projects: Option<i32>,
    pub publications: Option<i32>,
    pub tasks_weekly: Option<i32>,
}

impl PlanLimits {
    /// Built-in tier defaults, used when no stored config row exists.
    pub fn defaults(plan: PlanCode) -> Self {
        match plan {
            PlanCode::Basic => Self {
                seats: Some(1),
                projects: Some(1),
                publications: Some(5),
                tasks_weekly: Some(5),
            },
            PlanCode::Pro => Self {
                seats: Some(5),
                projects: Some(10),
                publications: Some(50),
                tasks_weekly: Some(50),
            },
            PlanCode::Business => Self {
                seats: Some(20),
                projects: Some(50),
                publications: Some(200),
                tasks_weekly: Some(200),
            },
            // Enterprise is contract-priced, everything unlimited.
            PlanCode::Enterprise => Self {
                seats: None,
                projects: None,
                publications: None,
                tasks_weekly: None,
            },
        }
    }

    pub fn for_kind(&self, kind: UsageKind) -> Option<i32> {
        match kind {
            UsageKind::Projects => self.projects,
            UsageKind::Publications => self.publications,
            UsageKind::Tasks => self.tasks_weekly,
        }
    }
}

/// Per-organization limit overrides.
///
/// `None` means "not set, fall through to the tier limit"; `Some(0)` is a
/// genuine zero limit and must survive resolution untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOverrides {
    pub seats: Option<i32>,
    pub projects: Option<i32>,
    pub publications: Option<i32>,
    pub tasks_weekly: Option<i32>,
}

/// Stored per-tier limit configuration. A NULL column means unlimited;
/// a missing row falls back to `PlanLimits::defaults`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanLimitConfig {
    pub plan: String,
    pub seats: Option<i32>,
    pub projects: Option<i32>,
    pub publications: Option<i32>,
    pub tasks_weekly: Option<i32>,
    pub updated_utc: DateTime<Utc>,
}

impl PlanLimitConfig {
    fn as_limits(&self) -> PlanLimits {
        PlanLimits {
            seats: self.seats,
            projects: self.projects,
            publications: self.publications,
            tasks_weekly: self.tasks_weekly,
        }
    }
}

/// Organization subscription record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrgSubscription {
    pub org_id: Uuid,
    pub plan: String,
    pub seats_override: Option<i32>,
    pub projects_override: Option<i32>,
    pub publications_override: Option<i32>,
    pub tasks_weekly_override: Option<i32>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl OrgSubscription {
    pub fn plan_code(&self) -> PlanCode {
        PlanCode::from_string(&self.plan)
    }

    pub fn overrides(&self) -> LimitOverrides {
        LimitOverrides {
            seats: self.seats_override,
            projects: self.projects_override,
            publications: self.publications_override,
            tasks_weekly: self.tasks_weekly_override,
        }
    }
}

/// Input for creating or updating an organization subscription.
#[derive(Debug, Clone)]
pub struct UpsertOrgSubscription {
    pub org_id: Uuid,
    pub plan: PlanCode,
    pub overrides: LimitOverrides,
}

/// Resolve effective limits: per-org override (including an explicit 0)
/// wins over the stored tier config, which wins over built-in defaults.
pub fn resolve_limits(
    plan: PlanCode,
    stored: Option<&PlanLimitConfig>,
    overrides: &LimitOverrides,
) -> PlanLimits {
    let base = match stored {
        Some(cfg) => cfg.as_limits(),
        None => PlanLimits::defaults(plan),
    };

    PlanLimits {
        seats: overrides.seats.or(base.seats),
        projects: overrides.projects.or(base.projects),
        publications: overrides.publications.or(base.publications),
        tasks_weekly: overrides.tasks_weekly.or(base.tasks_weekly),
    }
}
