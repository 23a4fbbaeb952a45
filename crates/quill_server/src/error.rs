use thiserror::Error;

/// Failure talking to a backing store.
///
/// Stores report only infrastructure faults through this type. Expected
/// outcomes such as "balance too low" travel as values in the store's
/// outcome enums.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out")]
    TimedOut,
}

/// Errors returned by [`CreditLedger`](crate::ledger::CreditLedger).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    /// Adding `amount` to `balance` would overflow. Nothing was changed.
    #[error("balance {balance} cannot take {amount} more credits")]
    BalanceOverflow { balance: i64, amount: i64 },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("coupon code is not valid")]
    InvalidCoupon,

    #[error("coupon already redeemed by this account")]
    AlreadyRedeemed,

    #[error("coupon is no longer active")]
    CouponInactive,

    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store did not answer in time. For mutating calls the outcome is
    /// unknown: the mutation may or may not have been applied.
    #[error("ledger operation timed out; outcome unknown")]
    OperationTimedOut,
}

impl LedgerError {
    /// True for typed outcomes that are surfaced to the caller as-is and
    /// must not be retried. False for infrastructure faults.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            LedgerError::StoreUnavailable(_) | LedgerError::OperationTimedOut
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => LedgerError::StoreUnavailable(reason),
            StoreError::TimedOut => LedgerError::OperationTimedOut,
        }
    }
}
