//! Platform-agnostic core for the Quill credit ledger and request admission.
//!
//! Everything in this crate talks to storage through two async contracts:
//!
//! - [`ledger::LedgerStore`]: a transactional store for accounts, the credit
//!   transaction log, coupons, and coupon redemptions.
//! - [`rate_limit::RateLimitStore`]: a shared counter store with atomic
//!   increment-and-expire, reachable by every server process.
//!
//! On top of those sit the components request handlers use:
//!
//! ```text
//! inbound request ─→ RequestGate ─→ handler ─→ CreditLedger::debit ─→ ContentGenerator
//!                     │    │
//!                     │    └─ SessionResolver (external identity, yes/no + account id)
//!                     └─ SlidingWindowLimiter ─→ RateLimitStore
//!
//! ReplenishmentScheduler ─→ CreditLedger::replenish   (independent of requests)
//! ```
//!
//! Server adapters provide concrete stores (SQLite, Redis, ...) and wire the
//! gate into their HTTP stack. The in-memory stores shipped here are used for
//! development, single-instance deployments, and tests.

pub mod clock;
pub mod error;
pub mod gate;
pub mod generation;
pub mod identity;
pub mod ledger;
pub mod rate_limit;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LedgerError, StoreError};
pub use gate::{GateDecision, RequestGate, RouteRule, RouteTable};
pub use generation::{
    ContentGenerator, GeneratedContent, GenerationError, GenerationRequest, PaidGeneration,
    PaidGenerationError, generate_paid,
};
pub use identity::SessionResolver;
pub use ledger::{
    Account, Coupon, CouponCredit, CouponRedemption, CreditLedger, CreditTransaction, LedgerStore,
    MemoryLedgerStore, TransactionReason,
};
pub use rate_limit::{
    LimitPolicy, LimiterClass, LimiterConfig, MemoryRateLimitStore, RateLimitDecision,
    RateLimitStore, SlidingWindowLimiter, WindowCount,
};
pub use scheduler::{ReplenishPolicy, ReplenishReport, ReplenishmentScheduler};
