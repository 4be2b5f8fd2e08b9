//! Wallets and the append-only transaction ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Transaction direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Credit,
    Debit,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Credit => "credit",
            TxType::Debit => "debit",
        }
    }
}

/// What a transaction paid for (or where money came from).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxSource {
    SignupBonus,
    Bid,
    StorageOverage,
    TopUp,
}

impl TxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxSource::SignupBonus => "signup_bonus",
            TxSource::Bid => "bid",
            TxSource::StorageOverage => "storage_overage",
            TxSource::TopUp => "top_up",
        }
    }
}

impl std::fmt::Display for TxSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wallet of a contractor or an organization.
///
/// Bonus balance is promotional credit and is always spent before the real
/// balance; both fields stay non-negative after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub wallet_id: Uuid,
    pub owner_id: Uuid,
    pub balance: Decimal,
    pub bonus_balance: Decimal,
    pub currency: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Wallet {
    pub fn available(&self) -> Decimal {
        self.balance + self.bonus_balance
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletTransaction {
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub amount: Decimal,
    pub tx_type: String,
    pub source: String,
    pub balance_after: Decimal,
    pub bonus_balance_after: Decimal,
    pub meta: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

/// Input for appending a ledger entry.
#[derive(Debug, Clone)]
pub struct NewWalletTransaction {
    pub wallet_id: Uuid,
    pub amount: Decimal,
    pub tx_type: TxType,
    pub source: TxSource,
    pub balance_after: Decimal,
    pub bonus_balance_after: Decimal,
    pub meta: Option<serde_json::Value>,
}

/// Input for charging a contractor for a bid.
#[derive(Debug, Clone)]
pub struct BidDebitParams {
    pub contractor_id: Uuid,
    pub task_id: Uuid,
    pub application_id: Option<Uuid>,
}

/// Result of a bid debit attempt. Insufficient funds is an expected
/// outcome reported as a value, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidDebitResult {
    pub ok: bool,
    pub cost: Decimal,
    pub available: Decimal,
    pub from_bonus: Decimal,
    pub from_balance: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_balance_after: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Split a charge across a wallet, spending bonus balance first.
///
/// Returns `None` when the combined balance cannot cover the cost; the
/// caller must not mutate anything in that case.
pub fn split_debit(
    balance: Decimal,
    bonus_balance: Decimal,
    cost: Decimal,
) -> Option<(Decimal, Decimal)> {
    if balance + bonus_balance < cost {
        return None;
    }
    let from_bonus = bonus_balance.min(cost);
    let from_balance = cost - from_bonus;
    Some((from_bonus, from_balance))
}

impl BidDebitResult {
    pub fn charged(cost: Decimal, from_bonus: Decimal, from_balance: Decimal, after: &Wallet) -> Self {
        Self {
            ok: true,
            cost,
            available: after.available(),
            from_bonus,
            from_balance,
            balance_after: Some(after.balance),
            bonus_balance_after: Some(after.bonus_balance),
            reason: None,
        }
    }

    pub fn insufficient(cost: Decimal, available: Decimal) -> Self {
        Self {
            ok: false,
            cost,
            available,
            from_bonus: Decimal::ZERO,
            from_balance: Decimal::ZERO,
            balance_after: None,
            bonus_balance_after: None,
            reason: Some("Недостаточно средств".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bonus_is_spent_before_balance() {
        let (from_bonus, from_balance) = split_debit(dec!(20), dec!(30), dec!(50)).unwrap();
        assert_eq!(from_bonus, dec!(30));
        assert_eq!(from_balance, dec!(20));
    }

    #[test]
    fn small_charge_comes_entirely_from_bonus() {
        let (from_bonus, from_balance) = split_debit(dec!(100), dec!(30), dec!(10)).unwrap();
        assert_eq!(from_bonus, dec!(10));
        assert_eq!(from_balance, Decimal::ZERO);
    }

    #[test]
    fn insufficient_funds_refuse_the_split() {
        assert!(split_debit(dec!(0), dec!(30), dec!(50)).is_none());
        assert!(split_debit(dec!(19), dec!(30), dec!(50)).is_none());
    }

    #[test]
    fn exact_cover_drains_both_balances() {
        let (from_bonus, from_balance) = split_debit(dec!(20), dec!(30), dec!(50)).unwrap();
        assert_eq!(from_bonus + from_balance, dec!(50));
    }
}
