use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_server::error::StoreError;
use quill_server::ledger::{
    Account, Coupon, CreditOutcome, CreditTransaction, DebitOutcome, LedgerStore,
    RedeemOutcome, ReplenishOutcome, TransactionReason, normalize_coupon_code,
};
use quill_server::SessionResolver;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use std::sync::{Arc, Mutex};

/// SQLite-backed [`LedgerStore`].
///
/// Every mutation runs in an `IMMEDIATE` transaction and applies its guard
/// inside the write statement itself (`... WHERE balance >= ? RETURNING`,
/// `ON CONFLICT DO NOTHING`), so concurrent writers from several processes
/// sharing the file cannot overdraw or double-credit. Increments carry a
/// `balance <= MAX - amount` guard: SQLite would otherwise turn an
/// overflowing sum into a REAL.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedgerStore {
    /// Create a new store with the given connection. The schema must already
    /// be initialized.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// A session resolver reading from the same database.
    pub fn session_resolver(&self) -> SqliteSessionResolver {
        SqliteSessionResolver {
            conn: self.conn.clone(),
        }
    }

    /// Runs `op` on the blocking pool with exclusive use of the connection.
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        blocking(self.conn.clone(), op).await
    }
}

async fn blocking<T, F>(conn: Arc<Mutex<Connection>>, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = conn
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger connection poisoned".to_string()))?;
        op(&mut conn).map_err(|e| StoreError::Unavailable(e.to_string()))
    })
    .await
    .map_err(|e| StoreError::Unavailable(format!("ledger task failed: {}", e)))?
}

fn write_tx(conn: &mut Connection) -> Result<Transaction<'_>, rusqlite::Error> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

fn append_transaction(
    tx: &Transaction<'_>,
    account_id: &str,
    delta: i64,
    reason: TransactionReason,
    memo: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT INTO credit_transactions (id, account_id, delta, reason, memo, occurred_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            uuid::Uuid::new_v4().to_string(),
            account_id,
            delta,
            reason.as_str(),
            memo,
            now.timestamp_millis()
        ],
    )?;
    Ok(())
}

fn current_balance(tx: &Transaction<'_>, account_id: &str) -> Result<Option<i64>, rusqlite::Error> {
    tx.query_row(
        "SELECT balance FROM accounts WHERE id = ?",
        [account_id],
        |row| row.get(0),
    )
    .optional()
}

fn select_account(conn: &Connection, account_id: &str) -> Result<Option<Account>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, balance, last_replenished_at FROM accounts WHERE id = ?",
        [account_id],
        |row| {
            Ok(Account {
                id: row.get(0)?,
                balance: row.get(1)?,
                last_replenished_at: millis_to_datetime(row.get(2)?),
            })
        },
    )
    .optional()
}

fn select_coupon(conn: &Connection, code: &str) -> Result<Option<Coupon>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, code, credit_amount, active, single_use FROM coupons WHERE code = ?",
        [code],
        |row| {
            Ok(Coupon {
                id: row.get(0)?,
                code: row.get(1)?,
                credit_amount: row.get(2)?,
                active: row.get::<_, i32>(3)? != 0,
                single_use: row.get::<_, i32>(4)? != 0,
            })
        },
    )
    .optional()
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        let account_id = account_id.to_string();
        self.run(move |conn| select_account(conn, &account_id)).await
    }

    async fn open_account(
        &self,
        account_id: &str,
        opening_balance: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let account_id = account_id.to_string();
        let account = self
            .run(move |conn| {
                let tx = write_tx(conn)?;
                let inserted = tx.execute(
                    "INSERT INTO accounts (id, balance, last_replenished_at, created_at)
                     VALUES (?1, ?2, ?3, ?3)
                     ON CONFLICT(id) DO NOTHING",
                    params![account_id, opening_balance, now.timestamp_millis()],
                )?;
                if inserted == 1 && opening_balance > 0 {
                    append_transaction(
                        &tx,
                        &account_id,
                        opening_balance,
                        TransactionReason::Replenish,
                        Some("opening grant"),
                        now,
                    )?;
                }
                let account = select_account(&tx, &account_id)?;
                tx.commit()?;
                Ok(account)
            })
            .await?;
        account.ok_or_else(|| StoreError::Unavailable("account vanished after insert".to_string()))
    }

    async fn debit(
        &self,
        account_id: &str,
        amount: i64,
        memo: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DebitOutcome, StoreError> {
        let account_id = account_id.to_string();
        let memo = memo.map(str::to_string);
        self.run(move |conn| {
            let tx = write_tx(conn)?;
            let updated: Option<i64> = tx
                .query_row(
                    "UPDATE accounts SET balance = balance - ?1
                     WHERE id = ?2 AND balance >= ?1
                     RETURNING balance",
                    params![amount, account_id],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match updated {
                Some(new_balance) => {
                    append_transaction(
                        &tx,
                        &account_id,
                        -amount,
                        TransactionReason::Debit,
                        memo.as_deref(),
                        now,
                    )?;
                    DebitOutcome::Applied { new_balance }
                }
                None => match current_balance(&tx, &account_id)? {
                    Some(available) => DebitOutcome::InsufficientBalance { available },
                    None => DebitOutcome::AccountMissing,
                },
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn credit(
        &self,
        account_id: &str,
        amount: i64,
        reason: TransactionReason,
        memo: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CreditOutcome, StoreError> {
        let account_id = account_id.to_string();
        let memo = memo.map(str::to_string);
        self.run(move |conn| {
            let tx = write_tx(conn)?;
            let updated: Option<i64> = tx
                .query_row(
                    "UPDATE accounts SET balance = balance + ?1
                     WHERE id = ?2 AND balance <= 9223372036854775807 - ?1
                     RETURNING balance",
                    params![amount, account_id],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match updated {
                Some(new_balance) => {
                    append_transaction(&tx, &account_id, amount, reason, memo.as_deref(), now)?;
                    CreditOutcome::Applied { new_balance }
                }
                None => match current_balance(&tx, &account_id)? {
                    Some(balance) => CreditOutcome::Overflow { balance },
                    None => CreditOutcome::AccountMissing,
                },
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn redeem_coupon(
        &self,
        account_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError> {
        let account_id = account_id.to_string();
        let code = normalize_coupon_code(code);
        self.run(move |conn| {
            let tx = write_tx(conn)?;
            let Some(balance) = current_balance(&tx, &account_id)? else {
                return Ok(RedeemOutcome::AccountMissing);
            };
            let Some(coupon) = select_coupon(&tx, &code)? else {
                return Ok(RedeemOutcome::UnknownCoupon);
            };
            let already: bool = tx
                .query_row(
                    "SELECT 1 FROM coupon_redemptions WHERE account_id = ? AND coupon_id = ?",
                    params![account_id, coupon.id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if already {
                return Ok(RedeemOutcome::AlreadyRedeemed);
            }
            if !coupon.active {
                return Ok(RedeemOutcome::Inactive);
            }

            if coupon.single_use {
                let claimed = tx.execute(
                    "UPDATE coupons SET active = 0 WHERE id = ? AND active = 1",
                    [&coupon.id],
                )?;
                if claimed == 0 {
                    return Ok(RedeemOutcome::Inactive);
                }
            }
            let inserted = tx.execute(
                "INSERT INTO coupon_redemptions (account_id, coupon_id, occurred_at)
                 VALUES (?, ?, ?)
                 ON CONFLICT(account_id, coupon_id) DO NOTHING",
                params![account_id, coupon.id, now.timestamp_millis()],
            )?;
            if inserted == 0 {
                return Ok(RedeemOutcome::AlreadyRedeemed);
            }

            // Returning without commit rolls back the flip and the redemption row.
            let Some(new_balance) = tx
                .query_row(
                    "UPDATE accounts SET balance = balance + ?1
                     WHERE id = ?2 AND balance <= 9223372036854775807 - ?1
                     RETURNING balance",
                    params![coupon.credit_amount, account_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
            else {
                return Ok(RedeemOutcome::Overflow {
                    balance,
                    amount: coupon.credit_amount,
                });
            };
            append_transaction(
                &tx,
                &account_id,
                coupon.credit_amount,
                TransactionReason::Coupon,
                Some(&coupon.code),
                now,
            )?;
            tx.commit()?;
            Ok(RedeemOutcome::Credited {
                amount: coupon.credit_amount,
                new_balance,
            })
        })
        .await
    }

    async fn replenish(
        &self,
        account_id: &str,
        grant: i64,
        due_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ReplenishOutcome, StoreError> {
        let account_id = account_id.to_string();
        self.run(move |conn| {
            let tx = write_tx(conn)?;
            let updated: Option<i64> = tx
                .query_row(
                    "UPDATE accounts SET balance = balance + ?1, last_replenished_at = ?2
                     WHERE id = ?3 AND last_replenished_at <= ?4
                       AND balance <= 9223372036854775807 - ?1
                     RETURNING balance",
                    params![
                        grant,
                        now.timestamp_millis(),
                        account_id,
                        due_before.timestamp_millis()
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match updated {
                Some(new_balance) => {
                    append_transaction(
                        &tx,
                        &account_id,
                        grant,
                        TransactionReason::Replenish,
                        None,
                        now,
                    )?;
                    ReplenishOutcome::Granted { new_balance }
                }
                None => match select_account(&tx, &account_id)? {
                    Some(account) if account.last_replenished_at <= due_before => {
                        ReplenishOutcome::Overflow {
                            balance: account.balance,
                        }
                    }
                    Some(_) => ReplenishOutcome::NotDue,
                    None => ReplenishOutcome::AccountMissing,
                },
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn accounts_due_for_replenishment(
        &self,
        due_before: DateTime<Utc>,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let after = after.map(str::to_string);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM accounts
                 WHERE last_replenished_at <= ?1 AND (?2 IS NULL OR id > ?2)
                 ORDER BY id ASC
                 LIMIT ?3",
            )?;
            let ids = stmt
                .query_map(
                    params![due_before.timestamp_millis(), after, limit],
                    |row| row.get(0),
                )?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
        .await
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        let account_id = account_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account_id, delta, reason, memo, occurred_at
                 FROM credit_transactions
                 WHERE account_id = ?
                 ORDER BY occurred_at DESC, rowid DESC
                 LIMIT ?",
            )?;
            let rows = stmt
                .query_map(params![account_id, limit], |row| {
                    let raw: String = row.get(3)?;
                    let reason = TransactionReason::parse(&raw).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            Type::Text,
                            format!("unknown transaction reason {:?}", raw).into(),
                        )
                    })?;
                    Ok(CreditTransaction {
                        id: row.get(0)?,
                        account_id: row.get(1)?,
                        delta: row.get(2)?,
                        reason,
                        memo: row.get(4)?,
                        occurred_at: millis_to_datetime(row.get(5)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn create_coupon(
        &self,
        code: &str,
        credit_amount: i64,
        single_use: bool,
    ) -> Result<Option<Coupon>, StoreError> {
        let code = normalize_coupon_code(code);
        self.run(move |conn| {
            let id = uuid::Uuid::new_v4().to_string();
            let inserted = conn.execute(
                "INSERT INTO coupons (id, code, credit_amount, active, single_use, created_at)
                 VALUES (?, ?, ?, 1, ?, ?)
                 ON CONFLICT(code) DO NOTHING",
                params![
                    id,
                    code,
                    credit_amount,
                    single_use as i32,
                    Utc::now().timestamp_millis()
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(Coupon {
                id,
                code,
                credit_amount,
                active: true,
                single_use,
            }))
        })
        .await
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let code = normalize_coupon_code(code);
        self.run(move |conn| select_coupon(conn, &code)).await
    }
}

/// Reads sessions issued by the identity system from `auth_sessions`.
#[derive(Clone)]
pub struct SqliteSessionResolver {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionResolver {
    /// Records a session for `account_id`. The identity system owns session
    /// issuance; this exists for local development and tests.
    pub async fn create_session(
        &self,
        account_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let account_id = account_id.to_string();
        blocking(self.conn.clone(), move |conn| {
            let token = uuid::Uuid::new_v4().simple().to_string();
            conn.execute(
                "INSERT INTO auth_sessions (token, account_id, expires_at, created_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    token,
                    account_id,
                    expires_at.timestamp(),
                    Utc::now().timestamp()
                ],
            )?;
            Ok(token)
        })
        .await
    }
}

#[async_trait]
impl SessionResolver for SqliteSessionResolver {
    async fn resolve(&self, token: &str) -> Result<Option<String>, StoreError> {
        let token = token.to_string();
        blocking(self.conn.clone(), move |conn| {
            conn.query_row(
                "SELECT account_id FROM auth_sessions WHERE token = ? AND expires_at > ?",
                params![token, Utc::now().timestamp()],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }
}

/// Convert Unix milliseconds to DateTime<Utc>
fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;

    fn setup_test_db() -> SqliteLedgerStore {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        SqliteLedgerStore::new(conn)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_open_account_is_idempotent() {
        let store = setup_test_db();

        let first = store.open_account("acct", 10, at(1_000)).await.unwrap();
        assert_eq!(first.balance, 10);
        assert_eq!(first.last_replenished_at, at(1_000));

        let second = store.open_account("acct", 50, at(2_000)).await.unwrap();
        assert_eq!(second, first);

        let history = store.list_transactions("acct", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, TransactionReason::Replenish);
        assert_eq!(history[0].memo.as_deref(), Some("opening grant"));
    }

    #[tokio::test]
    async fn test_debit_guard() {
        let store = setup_test_db();
        store.open_account("acct", 3, at(0)).await.unwrap();

        assert_eq!(
            store.debit("acct", 2, Some("generation"), at(1)).await.unwrap(),
            DebitOutcome::Applied { new_balance: 1 }
        );
        assert_eq!(
            store.debit("acct", 2, Some("generation"), at(2)).await.unwrap(),
            DebitOutcome::InsufficientBalance { available: 1 }
        );
        assert_eq!(
            store.debit("ghost", 1, None, at(3)).await.unwrap(),
            DebitOutcome::AccountMissing
        );

        let history = store.list_transactions("acct", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].delta, -2);
        assert_eq!(history[0].memo.as_deref(), Some("generation"));
    }

    #[tokio::test]
    async fn test_credit_missing_account() {
        let store = setup_test_db();
        let result = store
            .credit("ghost", 5, TransactionReason::Credit, None, at(0))
            .await
            .unwrap();
        assert_eq!(result, CreditOutcome::AccountMissing);
    }

    #[tokio::test]
    async fn test_increments_that_would_overflow_change_nothing() {
        let store = setup_test_db();
        store.open_account("whale", 5, at(0)).await.unwrap();
        store.create_coupon("BIG", 10, true).await.unwrap();

        assert_eq!(
            store
                .credit("whale", i64::MAX, TransactionReason::Credit, None, at(1))
                .await
                .unwrap(),
            CreditOutcome::Overflow { balance: 5 }
        );
        assert_eq!(
            store
                .credit("whale", i64::MAX - 5, TransactionReason::Credit, None, at(2))
                .await
                .unwrap(),
            CreditOutcome::Applied {
                new_balance: i64::MAX
            }
        );
        assert_eq!(
            store.redeem_coupon("whale", "BIG", at(3)).await.unwrap(),
            RedeemOutcome::Overflow {
                balance: i64::MAX,
                amount: 10
            }
        );
        assert_eq!(
            store.replenish("whale", 10, at(100), at(200)).await.unwrap(),
            ReplenishOutcome::Overflow { balance: i64::MAX }
        );

        // The refused redemption was rolled back with the flip
        assert!(store.get_coupon("BIG").await.unwrap().unwrap().active);
        let account = store.get_account("whale").await.unwrap().unwrap();
        assert_eq!(account.balance, i64::MAX);
        assert_eq!(account.last_replenished_at, at(0));
        assert_eq!(store.list_transactions("whale", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_reason_is_a_row_error() {
        let store = setup_test_db();
        store.open_account("acct", 5, at(0)).await.unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO credit_transactions (id, account_id, delta, reason, occurred_at)
                 VALUES ('t-odd', 'acct', 1, 'refund', 0)",
                [],
            )
            .unwrap();

        let result = store.list_transactions("acct", 10).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_coupon_redemption_outcomes() {
        let store = setup_test_db();
        store.open_account("alice", 0, at(0)).await.unwrap();
        store.open_account("bob", 0, at(0)).await.unwrap();
        store.create_coupon("spring10", 10, false).await.unwrap();
        store.create_coupon("NEW15", 15, true).await.unwrap();

        assert_eq!(
            store.redeem_coupon("alice", " Spring10 ", at(1)).await.unwrap(),
            RedeemOutcome::Credited {
                amount: 10,
                new_balance: 10
            }
        );
        assert_eq!(
            store.redeem_coupon("alice", "SPRING10", at(2)).await.unwrap(),
            RedeemOutcome::AlreadyRedeemed
        );
        assert_eq!(
            store.redeem_coupon("alice", "NOPE", at(3)).await.unwrap(),
            RedeemOutcome::UnknownCoupon
        );

        assert!(matches!(
            store.redeem_coupon("bob", "NEW15", at(4)).await.unwrap(),
            RedeemOutcome::Credited { amount: 15, .. }
        ));
        assert_eq!(
            store.redeem_coupon("alice", "NEW15", at(5)).await.unwrap(),
            RedeemOutcome::Inactive
        );
        // The redeemer of a single-use coupon still sees AlreadyRedeemed
        assert_eq!(
            store.redeem_coupon("bob", "NEW15", at(6)).await.unwrap(),
            RedeemOutcome::AlreadyRedeemed
        );

        let coupon = store.get_coupon("new15").await.unwrap().unwrap();
        assert!(!coupon.active);
    }

    #[tokio::test]
    async fn test_duplicate_coupon_code() {
        let store = setup_test_db();
        assert!(store.create_coupon("DUP", 5, false).await.unwrap().is_some());
        assert!(store.create_coupon(" dup", 7, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replenish_is_conditional_on_last_grant() {
        let store = setup_test_db();
        store.open_account("acct", 0, at(0)).await.unwrap();

        // Last grant at 0 is not before the cutoff of -1
        assert_eq!(
            store.replenish("acct", 10, at(-1), at(100)).await.unwrap(),
            ReplenishOutcome::NotDue
        );
        assert_eq!(
            store.replenish("acct", 10, at(0), at(100)).await.unwrap(),
            ReplenishOutcome::Granted { new_balance: 10 }
        );
        assert_eq!(
            store.replenish("acct", 10, at(0), at(100)).await.unwrap(),
            ReplenishOutcome::NotDue
        );
        assert_eq!(
            store.replenish("ghost", 10, at(0), at(100)).await.unwrap(),
            ReplenishOutcome::AccountMissing
        );
    }

    #[tokio::test]
    async fn test_due_accounts_page_by_id() {
        let store = setup_test_db();
        store.open_account("c", 0, at(10)).await.unwrap();
        store.open_account("a", 0, at(30)).await.unwrap();
        store.open_account("b", 0, at(20)).await.unwrap();
        store.open_account("later", 0, at(500)).await.unwrap();

        let due = store
            .accounts_due_for_replenishment(at(100), None, 10)
            .await
            .unwrap();
        assert_eq!(due, vec!["a", "b", "c"]);

        let page = store
            .accounts_due_for_replenishment(at(100), None, 2)
            .await
            .unwrap();
        assert_eq!(page, vec!["a", "b"]);
        let rest = store
            .accounts_due_for_replenishment(at(100), Some("b"), 2)
            .await
            .unwrap();
        assert_eq!(rest, vec!["c"]);
    }

    #[tokio::test]
    async fn test_session_resolution() {
        let store = setup_test_db();
        let sessions = store.session_resolver();

        let live = sessions
            .create_session("acct-1", Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        let expired = sessions
            .create_session("acct-2", Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(
            sessions.resolve(&live).await.unwrap(),
            Some("acct-1".to_string())
        );
        assert_eq!(sessions.resolve(&expired).await.unwrap(), None);
        assert_eq!(sessions.resolve("garbage").await.unwrap(), None);
    }
}
