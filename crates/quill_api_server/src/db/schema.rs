use rusqlite::Connection;

/// SQL schema for the credit ledger
const SCHEMA: &str = r#"
-- Accounts (created on first authenticated request)
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
    last_replenished_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_accounts_last_replenished ON accounts(last_replenished_at);

-- Append-only audit log; one row per balance change
CREATE TABLE IF NOT EXISTS credit_transactions (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    delta INTEGER NOT NULL,
    reason TEXT NOT NULL,               -- debit|credit|coupon|replenish
    memo TEXT,
    occurred_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_credit_transactions_account
    ON credit_transactions(account_id, occurred_at);

-- Coupons (code stored trimmed and upper-cased)
CREATE TABLE IF NOT EXISTS coupons (
    id TEXT PRIMARY KEY,
    code TEXT UNIQUE NOT NULL,
    credit_amount INTEGER NOT NULL CHECK (credit_amount > 0),
    active INTEGER NOT NULL DEFAULT 1,
    single_use INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

-- At most one redemption per (account, coupon)
CREATE TABLE IF NOT EXISTS coupon_redemptions (
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    coupon_id TEXT NOT NULL REFERENCES coupons(id) ON DELETE CASCADE,
    occurred_at INTEGER NOT NULL,
    PRIMARY KEY (account_id, coupon_id)
);

-- Sessions issued by the identity system; only read here
CREATE TABLE IF NOT EXISTS auth_sessions (
    token TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_expires ON auth_sessions(expires_at);
"#;

/// Initialize the database schema
pub fn init_database(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        init_database(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            tables,
            vec![
                "accounts",
                "auth_sessions",
                "coupon_redemptions",
                "coupons",
                "credit_transactions"
            ]
        );
    }

    #[test]
    fn test_balance_cannot_go_negative() {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        conn.execute(
            "INSERT INTO accounts (id, balance, last_replenished_at, created_at) VALUES ('a', 1, 0, 0)",
            [],
        )
        .unwrap();

        let result = conn.execute("UPDATE accounts SET balance = balance - 2 WHERE id = 'a'", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_redemption_is_unique_per_account_and_coupon() {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO accounts (id, balance, last_replenished_at, created_at) VALUES ('a', 0, 0, 0);
            INSERT INTO coupons (id, code, credit_amount, created_at) VALUES ('c', 'SPRING10', 10, 0);
            INSERT INTO coupon_redemptions (account_id, coupon_id, occurred_at) VALUES ('a', 'c', 0);
            "#,
        )
        .unwrap();

        let again = conn.execute(
            "INSERT INTO coupon_redemptions (account_id, coupon_id, occurred_at) VALUES ('a', 'c', 1)",
            [],
        );
        assert!(again.is_err());
    }
}
