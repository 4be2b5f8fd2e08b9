//! Usage counters and slot-consumption outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::period::Period;
use super::plan::PlanCode;

/// Countable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Projects,
    Publications,
    Tasks,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageKind::Projects => "projects",
            UsageKind::Publications => "publications",
            UsageKind::Tasks => "tasks",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "projects" => Some(UsageKind::Projects),
            "publications" => Some(UsageKind::Publications),
            "tasks" => Some(UsageKind::Tasks),
            _ => None,
        }
    }

    /// Counter bucket for this kind: projects and publications are monthly,
    /// task creation is throttled per ISO week.
    pub fn period_for(&self, now: DateTime<Utc>) -> Period {
        match self {
            UsageKind::Projects | UsageKind::Publications => Period::month_of(now),
            UsageKind::Tasks => Period::week_of(now),
        }
    }
}

impl std::fmt::Display for UsageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-(organization, period) usage counter.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageCounter {
    pub counter_id: Uuid,
    pub org_id: Uuid,
    pub period: String,
    pub projects_used: i32,
    pub publications_used: i32,
    pub tasks_used: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl UsageCounter {
    pub fn count(&self, kind: UsageKind) -> i32 {
        match kind {
            UsageKind::Projects => self.projects_used,
            UsageKind::Publications => self.publications_used,
            UsageKind::Tasks => self.tasks_used,
        }
    }
}

/// Result of a slot-consumption attempt. A refused slot is an expected
/// business outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotOutcome {
    pub ok: bool,
    pub plan: PlanCode,
    pub limit: Option<i32>,
    pub used: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SlotOutcome {
    pub fn granted(plan: PlanCode, limit: Option<i32>, used: i32) -> Self {
        Self {
            ok: true,
            plan,
            limit,
            used,
            reason: None,
        }
    }

    pub fn limit_reached(plan: PlanCode, limit: i32, used: i32) -> Self {
        Self {
            ok: false,
            plan,
            limit: Some(limit),
            used,
            reason: Some(format!("Лимит исчерпан: {}/{}", used, limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kinds_bucket_into_the_right_period_flavor() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap();
        assert_eq!(UsageKind::Projects.period_for(now).key(), "2026-03");
        assert_eq!(UsageKind::Publications.period_for(now).key(), "2026-03");
        assert_eq!(UsageKind::Tasks.period_for(now).key(), "2026-W10");
    }

    #[test]
    fn limit_reached_reports_used_and_limit() {
        let outcome = SlotOutcome::limit_reached(PlanCode::Basic, 5, 5);
        assert!(!outcome.ok);
        assert_eq!(outcome.reason.as_deref(), Some("Лимит исчерпан: 5/5"));
    }
}
