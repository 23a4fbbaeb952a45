//! Ledger races against SQLite, including two connections sharing one file
//! the way two server processes would.

use quill_api_server::db::{SqliteLedgerStore, init_database};
use quill_server::{CreditLedger, LedgerError};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;

struct TempDb(PathBuf);

impl TempDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("quill-ledger-test-{}.db", uuid::Uuid::new_v4()));
        let conn = Connection::open(&path).expect("create db file");
        init_database(&conn).expect("init db");
        Self(path)
    }

    /// A ledger on its own connection to the shared file.
    fn ledger(&self) -> CreditLedger {
        let conn = Connection::open(&self.0).expect("open db file");
        init_database(&conn).expect("init db");
        CreditLedger::new(Arc::new(SqliteLedgerStore::new(conn)))
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_credit_spent_once_across_connections() {
    let db = TempDb::new();
    let first = db.ledger();
    let second = db.ledger();
    first.open_account("acct", 1).await.unwrap();

    let a = tokio::spawn(async move { first.debit("acct", 1, "generation").await });
    let b = tokio::spawn(async move { second.debit("acct", 1, "generation").await });
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(LedgerError::InsufficientBalance {
            available: 0,
            requested: 1
        })
    )));
    assert_eq!(db.ledger().get_balance("acct").await, Ok(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_use_coupon_across_connections() {
    let db = TempDb::new();
    let setup = db.ledger();
    setup.open_account("alice", 0).await.unwrap();
    setup.open_account("bob", 0).await.unwrap();
    setup.create_coupon("NEW15", 15, true).await.unwrap();

    let alice_ledger = db.ledger();
    let bob_ledger = db.ledger();
    let alice = tokio::spawn(async move { alice_ledger.redeem_coupon("alice", "NEW15").await });
    let bob = tokio::spawn(async move { bob_ledger.redeem_coupon("bob", "NEW15").await });
    let results = [alice.await.unwrap(), bob.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.contains(&Err(LedgerError::CouponInactive)));

    let alice = setup.get_balance("alice").await.unwrap();
    let bob = setup.get_balance("bob").await.unwrap();
    assert_eq!(alice + bob, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_debits_match_the_audit_log() {
    let db = TempDb::new();
    let setup = db.ledger();
    setup.open_account("acct", 20).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..40 {
        let ledger = db.ledger();
        handles.push(tokio::spawn(async move {
            if i % 5 == 0 {
                ledger.credit("acct", 1, "support").await
            } else {
                ledger.debit("acct", 1, "generation").await
            }
        }));
    }
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) | Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected ledger error: {}", other),
        }
    }

    let balance = setup.get_balance("acct").await.unwrap();
    assert!(balance >= 0);
    let history = setup.transactions("acct", usize::MAX).await.unwrap();
    assert_eq!(history.iter().map(|tx| tx.delta).sum::<i64>(), balance);
}
