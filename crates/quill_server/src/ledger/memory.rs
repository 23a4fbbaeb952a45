use super::store::LedgerStore;
use super::types::{
    Account, Coupon, CouponRedemption, CreditOutcome, CreditTransaction, DebitOutcome,
    RedeemOutcome, ReplenishOutcome, TransactionReason, normalize_coupon_code,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LedgerTables {
    accounts: HashMap<String, Account>,
    transactions: Vec<CreditTransaction>,
    /// Keyed by normalized code.
    coupons: HashMap<String, Coupon>,
    redemptions: Vec<CouponRedemption>,
    redemption_keys: HashSet<(String, String)>,
}

impl LedgerTables {
    fn append(
        &mut self,
        account_id: &str,
        delta: i64,
        reason: TransactionReason,
        memo: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.transactions.push(CreditTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            delta,
            reason,
            memo: memo.map(str::to_string),
            occurred_at: now,
        });
    }
}

/// In-process [`LedgerStore`].
///
/// One mutex guards every table, so each operation runs as if serializable.
/// Only suitable for a single process.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    tables: Arc<Mutex<LedgerTables>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerTables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger tables poisoned".to_string()))
    }

    /// Overwrites an account's replenishment stamp. Test seeding only; not
    /// an audited ledger mutation.
    pub fn set_last_replenished_at(&self, account_id: &str, at: DateTime<Utc>) -> bool {
        match self.lock() {
            Ok(mut tables) => match tables.accounts.get_mut(account_id) {
                Some(account) => {
                    account.last_replenished_at = at;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// All redemption rows, in insertion order.
    pub fn redemptions(&self) -> Vec<CouponRedemption> {
        self.lock()
            .map(|tables| tables.redemptions.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.accounts.get(account_id).cloned())
    }

    async fn open_account(
        &self,
        account_id: &str,
        opening_balance: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables.accounts.get(account_id) {
            return Ok(existing.clone());
        }
        let account = Account {
            id: account_id.to_string(),
            balance: opening_balance,
            last_replenished_at: now,
        };
        tables.accounts.insert(account_id.to_string(), account.clone());
        if opening_balance > 0 {
            tables.append(
                account_id,
                opening_balance,
                TransactionReason::Replenish,
                Some("opening grant"),
                now,
            );
        }
        Ok(account)
    }

    async fn debit(
        &self,
        account_id: &str,
        amount: i64,
        memo: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DebitOutcome, StoreError> {
        let mut tables = self.lock()?;
        let Some(account) = tables.accounts.get_mut(account_id) else {
            return Ok(DebitOutcome::AccountMissing);
        };
        if account.balance < amount {
            return Ok(DebitOutcome::InsufficientBalance {
                available: account.balance,
            });
        }
        account.balance -= amount;
        let new_balance = account.balance;
        tables.append(account_id, -amount, TransactionReason::Debit, memo, now);
        Ok(DebitOutcome::Applied { new_balance })
    }

    async fn credit(
        &self,
        account_id: &str,
        amount: i64,
        reason: TransactionReason,
        memo: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CreditOutcome, StoreError> {
        let mut tables = self.lock()?;
        let Some(account) = tables.accounts.get_mut(account_id) else {
            return Ok(CreditOutcome::AccountMissing);
        };
        let Some(new_balance) = account.balance.checked_add(amount) else {
            return Ok(CreditOutcome::Overflow {
                balance: account.balance,
            });
        };
        account.balance = new_balance;
        tables.append(account_id, amount, reason, memo, now);
        Ok(CreditOutcome::Applied { new_balance })
    }

    async fn redeem_coupon(
        &self,
        account_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError> {
        let mut tables = self.lock()?;
        let Some(balance) = tables.accounts.get(account_id).map(|account| account.balance) else {
            return Ok(RedeemOutcome::AccountMissing);
        };
        let Some(coupon) = tables.coupons.get(&normalize_coupon_code(code)).cloned() else {
            return Ok(RedeemOutcome::UnknownCoupon);
        };
        let key = (account_id.to_string(), coupon.id.clone());
        if tables.redemption_keys.contains(&key) {
            return Ok(RedeemOutcome::AlreadyRedeemed);
        }
        if !coupon.active {
            return Ok(RedeemOutcome::Inactive);
        }
        let Some(new_balance) = balance.checked_add(coupon.credit_amount) else {
            return Ok(RedeemOutcome::Overflow {
                balance,
                amount: coupon.credit_amount,
            });
        };

        tables.redemption_keys.insert(key);
        tables.redemptions.push(CouponRedemption {
            account_id: account_id.to_string(),
            coupon_id: coupon.id.clone(),
            occurred_at: now,
        });
        if coupon.single_use {
            if let Some(stored) = tables.coupons.get_mut(&coupon.code) {
                stored.active = false;
            }
        }
        if let Some(account) = tables.accounts.get_mut(account_id) {
            account.balance = new_balance;
        }
        tables.append(
            account_id,
            coupon.credit_amount,
            TransactionReason::Coupon,
            Some(&coupon.code),
            now,
        );
        Ok(RedeemOutcome::Credited {
            amount: coupon.credit_amount,
            new_balance,
        })
    }

    async fn replenish(
        &self,
        account_id: &str,
        grant: i64,
        due_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ReplenishOutcome, StoreError> {
        let mut tables = self.lock()?;
        let Some(account) = tables.accounts.get_mut(account_id) else {
            return Ok(ReplenishOutcome::AccountMissing);
        };
        if account.last_replenished_at > due_before {
            return Ok(ReplenishOutcome::NotDue);
        }
        let Some(new_balance) = account.balance.checked_add(grant) else {
            return Ok(ReplenishOutcome::Overflow {
                balance: account.balance,
            });
        };
        account.balance = new_balance;
        account.last_replenished_at = now;
        tables.append(account_id, grant, TransactionReason::Replenish, None, now);
        Ok(ReplenishOutcome::Granted { new_balance })
    }

    async fn accounts_due_for_replenishment(
        &self,
        due_before: DateTime<Utc>,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let tables = self.lock()?;
        let mut due: Vec<&str> = tables
            .accounts
            .values()
            .filter(|account| account.last_replenished_at <= due_before)
            .filter(|account| after.is_none_or(|after| account.id.as_str() > after))
            .map(|account| account.id.as_str())
            .collect();
        due.sort_unstable();
        Ok(due.into_iter().take(limit).map(str::to_string).collect())
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.account_id == account_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_coupon(
        &self,
        code: &str,
        credit_amount: i64,
        single_use: bool,
    ) -> Result<Option<Coupon>, StoreError> {
        let code = normalize_coupon_code(code);
        let mut tables = self.lock()?;
        if tables.coupons.contains_key(&code) {
            return Ok(None);
        }
        let coupon = Coupon {
            id: uuid::Uuid::new_v4().to_string(),
            code: code.clone(),
            credit_amount,
            active: true,
            single_use,
        };
        tables.coupons.insert(code, coupon.clone());
        Ok(Some(coupon))
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self
            .lock()?
            .coupons
            .get(&normalize_coupon_code(code))
            .cloned())
    }
}
