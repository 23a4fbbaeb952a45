//! The authoritative credit balance API.
//!
//! [`CreditLedger`] validates arguments, bounds every store call with a
//! timeout, and turns store outcomes into [`LedgerError`]s. All atomicity
//! lives in the [`LedgerStore`] implementation; the ledger itself never
//! computes a balance.

mod memory;
mod store;
mod types;

pub use memory::MemoryLedgerStore;
pub use store::LedgerStore;
pub use types::{
    Account, Coupon, CouponRedemption, CreditOutcome, CreditTransaction, DebitOutcome,
    RedeemOutcome, ReplenishOutcome, TransactionReason, normalize_coupon_code,
};

use crate::clock::{Clock, SystemClock};
use crate::error::{LedgerError, StoreError};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Credits added by a successful coupon redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponCredit {
    pub credited: i64,
    pub new_balance: i64,
}

#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs a store call under the configured timeout.
    async fn bounded<T, F>(
        &self,
        op: &'static str,
        account_id: &str,
        call: F,
    ) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::TimedOut),
        };
        result.map_err(|err| {
            error!("Ledger {} for account {} failed: {}", op, account_id, err);
            LedgerError::from(err)
        })
    }

    pub async fn account(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        self.bounded("lookup", account_id, self.store.get_account(account_id))
            .await
    }

    /// Current balance. Read-only.
    pub async fn get_balance(&self, account_id: &str) -> Result<i64, LedgerError> {
        self.account(account_id)
            .await?
            .map(|account| account.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// Creates the account on first sight, granting `opening_grant` credits.
    /// Existing accounts are returned untouched.
    pub async fn open_account(
        &self,
        account_id: &str,
        opening_grant: i64,
    ) -> Result<Account, LedgerError> {
        if opening_grant < 0 {
            return Err(LedgerError::InvalidAmount(opening_grant));
        }
        let now = self.clock.now();
        self.bounded(
            "open",
            account_id,
            self.store.open_account(account_id, opening_grant, now),
        )
        .await
    }

    /// Spends `amount` credits if, and only if, the balance covers it at the
    /// moment of the atomic update.
    ///
    /// `InsufficientBalance` is a normal outcome and must not be retried. On
    /// `OperationTimedOut` the debit may have been applied.
    pub async fn debit(
        &self,
        account_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<i64, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let now = self.clock.now();
        let outcome = self
            .bounded(
                "debit",
                account_id,
                self.store.debit(account_id, amount, Some(reason), now),
            )
            .await?;

        match outcome {
            DebitOutcome::Applied { new_balance } => {
                info!(
                    "Debited {} credits from {} ({}); balance now {}",
                    amount, account_id, reason, new_balance
                );
                Ok(new_balance)
            }
            DebitOutcome::InsufficientBalance { available } => {
                debug!(
                    "Debit of {} refused for {}: only {} available",
                    amount, account_id, available
                );
                Err(LedgerError::InsufficientBalance {
                    available,
                    requested: amount,
                })
            }
            DebitOutcome::AccountMissing => {
                Err(LedgerError::AccountNotFound(account_id.to_string()))
            }
        }
    }

    /// Unconditionally adds `amount` credits.
    pub async fn credit(
        &self,
        account_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<i64, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let now = self.clock.now();
        let outcome = self
            .bounded(
                "credit",
                account_id,
                self.store.credit(
                    account_id,
                    amount,
                    TransactionReason::Credit,
                    Some(reason),
                    now,
                ),
            )
            .await?;

        match outcome {
            CreditOutcome::Applied { new_balance } => {
                info!(
                    "Credited {} credits to {} ({}); balance now {}",
                    amount, account_id, reason, new_balance
                );
                Ok(new_balance)
            }
            CreditOutcome::Overflow { balance } => {
                Err(overflow(account_id, "credit", balance, amount))
            }
            CreditOutcome::AccountMissing => {
                Err(LedgerError::AccountNotFound(account_id.to_string()))
            }
        }
    }

    pub async fn redeem_coupon(
        &self,
        account_id: &str,
        code: &str,
    ) -> Result<CouponCredit, LedgerError> {
        if normalize_coupon_code(code).is_empty() {
            return Err(LedgerError::InvalidCoupon);
        }
        let now = self.clock.now();
        let outcome = self
            .bounded(
                "redeem",
                account_id,
                self.store.redeem_coupon(account_id, code, now),
            )
            .await?;

        match outcome {
            RedeemOutcome::Credited {
                amount,
                new_balance,
            } => {
                info!(
                    "Account {} redeemed coupon {} for {} credits",
                    account_id,
                    normalize_coupon_code(code),
                    amount
                );
                Ok(CouponCredit {
                    credited: amount,
                    new_balance,
                })
            }
            RedeemOutcome::UnknownCoupon => Err(LedgerError::InvalidCoupon),
            RedeemOutcome::Inactive => Err(LedgerError::CouponInactive),
            RedeemOutcome::AlreadyRedeemed => Err(LedgerError::AlreadyRedeemed),
            RedeemOutcome::Overflow { balance, amount } => {
                Err(overflow(account_id, "coupon", balance, amount))
            }
            RedeemOutcome::AccountMissing => {
                Err(LedgerError::AccountNotFound(account_id.to_string()))
            }
        }
    }

    /// Grants `grant` credits if the last grant is at least `period` old.
    /// Returns whether a grant was applied. Concurrent calls for the same
    /// account apply at most one grant per period.
    pub async fn replenish(
        &self,
        account_id: &str,
        grant: i64,
        period: chrono::Duration,
    ) -> Result<bool, LedgerError> {
        if grant <= 0 {
            return Err(LedgerError::InvalidAmount(grant));
        }
        let now = self.clock.now();
        let due_before = now - period;
        let outcome = self
            .bounded(
                "replenish",
                account_id,
                self.store.replenish(account_id, grant, due_before, now),
            )
            .await?;

        match outcome {
            ReplenishOutcome::Granted { new_balance } => {
                info!(
                    "Replenished {} with {} credits; balance now {}",
                    account_id, grant, new_balance
                );
                Ok(true)
            }
            ReplenishOutcome::NotDue => Ok(false),
            ReplenishOutcome::Overflow { balance } => {
                Err(overflow(account_id, "replenish", balance, grant))
            }
            ReplenishOutcome::AccountMissing => {
                Err(LedgerError::AccountNotFound(account_id.to_string()))
            }
        }
    }

    /// Accounts whose last grant is at least `period` old, in id order.
    /// Pass the last id of the previous page as `after` to continue.
    pub async fn due_for_replenishment(
        &self,
        period: chrono::Duration,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, LedgerError> {
        let due_before = self.clock.now() - period;
        self.bounded(
            "due scan",
            "*",
            self.store
                .accounts_due_for_replenishment(due_before, after, limit),
        )
        .await
    }

    /// Newest first.
    pub async fn transactions(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, LedgerError> {
        self.bounded(
            "history",
            account_id,
            self.store.list_transactions(account_id, limit),
        )
        .await
    }

    /// Registers a coupon. `None` if the code is taken.
    pub async fn create_coupon(
        &self,
        code: &str,
        credit_amount: i64,
        single_use: bool,
    ) -> Result<Option<Coupon>, LedgerError> {
        if credit_amount <= 0 {
            return Err(LedgerError::InvalidAmount(credit_amount));
        }
        if normalize_coupon_code(code).is_empty() {
            return Err(LedgerError::InvalidCoupon);
        }
        self.bounded(
            "create coupon",
            "*",
            self.store.create_coupon(code, credit_amount, single_use),
        )
        .await
    }

    pub async fn coupon(&self, code: &str) -> Result<Option<Coupon>, LedgerError> {
        self.bounded("coupon lookup", "*", self.store.get_coupon(code))
            .await
    }
}

fn overflow(account_id: &str, op: &str, balance: i64, amount: i64) -> LedgerError {
    warn!(
        "Refused {} of {} credits to {}: balance {} would overflow",
        op, amount, account_id, balance
    );
    LedgerError::BalanceOverflow { balance, amount }
}
