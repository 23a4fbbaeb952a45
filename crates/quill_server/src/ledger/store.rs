use super::types::{
    Account, Coupon, CreditOutcome, CreditTransaction, DebitOutcome, RedeemOutcome,
    ReplenishOutcome, TransactionReason,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Transactional storage behind [`CreditLedger`](super::CreditLedger).
///
/// Every mutating method is one atomic unit at the store: the condition
/// check, the balance write, and the audit row either all happen or none
/// do. Implementations must never read a balance into memory, compute a new
/// value, and write it back in separate steps.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError>;

    /// Creates the account if it does not exist yet. When created with a
    /// positive `opening_balance`, a `replenish` transaction is appended in
    /// the same unit. Returns the account as stored.
    async fn open_account(
        &self,
        account_id: &str,
        opening_balance: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    /// Decrements the balance by `amount` only if `balance >= amount`.
    async fn debit(
        &self,
        account_id: &str,
        amount: i64,
        memo: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DebitOutcome, StoreError>;

    /// Increments the balance unless the sum would overflow.
    async fn credit(
        &self,
        account_id: &str,
        amount: i64,
        reason: TransactionReason,
        memo: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CreditOutcome, StoreError>;

    /// Inserts the redemption row (unique on account + coupon), credits the
    /// account, and deactivates a single-use coupon, all in one unit. A lost
    /// race on either guard is reported, never retried.
    async fn redeem_coupon(
        &self,
        account_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError>;

    /// Credits `grant` and stamps `last_replenished_at = now` only if
    /// `last_replenished_at <= due_before`.
    async fn replenish(
        &self,
        account_id: &str,
        grant: i64,
        due_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ReplenishOutcome, StoreError>;

    /// Ids of accounts whose last grant is at or before `due_before`, in id
    /// order, starting strictly after the `after` id.
    async fn accounts_due_for_replenishment(
        &self,
        due_before: DateTime<Utc>,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Newest first.
    async fn list_transactions(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, StoreError>;

    /// `None` when a coupon with the same code already exists.
    async fn create_coupon(
        &self,
        code: &str,
        credit_amount: i64,
        single_use: bool,
    ) -> Result<Option<Coupon>, StoreError>;

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError>;
}
