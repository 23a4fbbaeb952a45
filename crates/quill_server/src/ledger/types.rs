use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A spendable credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: String,
    pub balance: i64,
    pub last_replenished_at: DateTime<Utc>,
}

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionReason {
    Debit,
    Credit,
    Coupon,
    Replenish,
}

impl TransactionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionReason::Debit => "debit",
            TransactionReason::Credit => "credit",
            TransactionReason::Coupon => "coupon",
            TransactionReason::Replenish => "replenish",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(TransactionReason::Debit),
            "credit" => Some(TransactionReason::Credit),
            "coupon" => Some(TransactionReason::Coupon),
            "replenish" => Some(TransactionReason::Replenish),
            _ => None,
        }
    }
}

/// One row of the append-only audit log. Exactly one exists per balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditTransaction {
    pub id: String,
    pub account_id: String,
    pub delta: i64,
    pub reason: TransactionReason,
    /// Caller-supplied note, e.g. `"generation"` for a paid generation.
    pub memo: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A promotional code worth a fixed number of credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coupon {
    pub id: String,
    pub code: String,
    pub credit_amount: i64,
    pub active: bool,
    pub single_use: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponRedemption {
    pub account_id: String,
    pub coupon_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Result of an atomic conditional debit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Applied { new_balance: i64 },
    InsufficientBalance { available: i64 },
    AccountMissing,
}

/// Result of an unconditional credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    Applied { new_balance: i64 },
    /// The new balance would not fit in an `i64`. Nothing was written.
    Overflow { balance: i64 },
    AccountMissing,
}

/// Result of an atomic coupon redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    Credited { amount: i64, new_balance: i64 },
    UnknownCoupon,
    Inactive,
    AlreadyRedeemed,
    /// Nothing was written: the coupon stays active and unredeemed.
    Overflow { balance: i64, amount: i64 },
    AccountMissing,
}

/// Result of an atomic "grant if due".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplenishOutcome {
    Granted { new_balance: i64 },
    NotDue,
    Overflow { balance: i64 },
    AccountMissing,
}

/// Normalizes a coupon code for storage and lookup.
pub fn normalize_coupon_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
