//! Request/response DTOs for the HTTP surface.

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Body for `POST /orgs/{org_id}/storage/bytes`.
///
/// `adjust` permits signed corrections (deletions); plain uploads must
/// report a non-negative delta.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StorageBytesRequest {
    pub delta: i64,
    #[serde(default)]
    pub adjust: bool,
}

/// Body for `POST /orgs/{org_id}/storage/charge`. The timestamp override
/// lets a scheduler replay a specific hour.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageChargeRequest {
    pub now: Option<chrono::DateTime<chrono::Utc>>,
}

/// Body for `POST /wallets/{owner_id}/bid-charges`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BidChargeRequest {
    pub task_id: Uuid,
    pub application_id: Option<Uuid>,
}

/// Body for `POST /wallets/{owner_id}/credits`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreditRequest {
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    pub meta: Option<serde_json::Value>,
}

fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount_not_positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn credit_request_rejects_non_positive_amounts() {
        let zero = CreditRequest {
            amount: dec!(0),
            meta: None,
        };
        assert!(zero.validate().is_err());

        let negative = CreditRequest {
            amount: dec!(-5),
            meta: None,
        };
        assert!(negative.validate().is_err());

        let fine = CreditRequest {
            amount: dec!(100),
            meta: None,
        };
        assert!(fine.validate().is_ok());
    }
}
