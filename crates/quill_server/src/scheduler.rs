//! Periodic credit top-ups.
//!
//! The scheduler keeps no state of its own. Whether an account already got
//! this period's grant is recorded only in its `last_replenished_at`, and
//! [`CreditLedger::replenish`] checks and stamps it atomically, so overlapping
//! runs (two cron ticks, two instances) never double-grant.

use crate::error::LedgerError;
use crate::ledger::CreditLedger;
use futures::StreamExt;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplenishPolicy {
    /// Credits granted per period.
    pub grant: i64,
    pub period: chrono::Duration,
    /// Due accounts fetched per page.
    pub batch_size: usize,
    /// Replenish calls in flight at once.
    pub concurrency: usize,
}

impl Default for ReplenishPolicy {
    fn default() -> Self {
        Self {
            grant: 10,
            period: chrono::Duration::hours(24),
            batch_size: 500,
            concurrency: 8,
        }
    }
}

/// Summary of one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplenishReport {
    pub examined: usize,
    pub granted: usize,
    /// Already topped up by a concurrent pass.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ReplenishmentScheduler {
    ledger: CreditLedger,
    policy: ReplenishPolicy,
}

impl ReplenishmentScheduler {
    pub fn new(ledger: CreditLedger, policy: ReplenishPolicy) -> Self {
        Self { ledger, policy }
    }

    pub fn policy(&self) -> &ReplenishPolicy {
        &self.policy
    }

    /// Tops up every account that is due right now.
    ///
    /// Fails only if the due-account scan itself fails; individual
    /// replenish failures are counted and logged.
    pub async fn run_once(&self) -> Result<ReplenishReport, LedgerError> {
        let mut report = ReplenishReport::default();
        let batch_size = self.policy.batch_size.max(1);
        // Failed accounts stay due, so pages advance by id instead of
        // restarting from the top.
        let mut cursor: Option<String> = None;

        loop {
            let due = self
                .ledger
                .due_for_replenishment(self.policy.period, cursor.as_deref(), batch_size)
                .await?;
            let page_len = due.len();
            let Some(last) = due.last().cloned() else {
                break;
            };
            cursor = Some(last);

            let outcomes: Vec<(String, Result<bool, LedgerError>)> =
                futures::stream::iter(due)
                    .map(|account_id| async move {
                        let outcome = self
                            .ledger
                            .replenish(&account_id, self.policy.grant, self.policy.period)
                            .await;
                        (account_id, outcome)
                    })
                    .buffer_unordered(self.policy.concurrency.max(1))
                    .collect()
                    .await;

            for (account_id, outcome) in outcomes {
                report.examined += 1;
                match outcome {
                    Ok(true) => report.granted += 1,
                    Ok(false) => report.skipped += 1,
                    Err(err) => {
                        warn!("Replenishment failed for {}: {}", account_id, err);
                        report.failed += 1;
                    }
                }
            }

            if page_len < batch_size {
                break;
            }
        }

        info!(
            "Replenishment pass: examined={} granted={} skipped={} failed={}",
            report.examined, report.granted, report.skipped, report.failed
        );
        Ok(report)
    }
}
