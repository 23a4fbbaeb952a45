//! Fixed-bucket request limiter.
//!
//! Each `(limiter class, identifier)` pair owns one counter bucket in the
//! [`RateLimitStore`]. The bucket starts at its first request, lives for the
//! class's window, and counts every request that reaches it, admitted or not.
//! A request is allowed while the count stays within the class budget.
//!
//! Buckets are fixed, not a rolling log: a burst that straddles the end of
//! one bucket and the start of the next can be admitted up to twice the
//! budget within a short span. That approximation is accepted.

mod memory;
mod store;

pub use memory::MemoryRateLimitStore;
pub use store::{RateLimitStore, WindowCount};

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_KEY_PREFIX: &str = "quill:ratelimit";
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// Independent rate-limit budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterClass {
    /// Coarse default for everything else.
    General,
    /// Sign-in and session endpoints; stricter to blunt credential stuffing.
    Authentication,
    /// Paid generation endpoints; strictest.
    Generation,
}

impl LimiterClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterClass::General => "general",
            LimiterClass::Authentication => "auth",
            LimiterClass::Generation => "generation",
        }
    }
}

impl fmt::Display for LimiterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budget of one limiter class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub max_requests: u64,
    pub window: Duration,
}

impl LimitPolicy {
    pub const fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Parses `"<max_requests>/<window_secs>"`, e.g. `"60/60"`.
    pub fn parse(spec: &str) -> Option<Self> {
        let (max, secs) = spec.trim().split_once('/')?;
        let max_requests: u64 = max.trim().parse().ok()?;
        let window_secs: u64 = secs.trim().parse().ok()?;
        if max_requests == 0 || window_secs == 0 {
            return None;
        }
        Some(Self::new(max_requests, Duration::from_secs(window_secs)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    pub general: LimitPolicy,
    pub authentication: LimitPolicy,
    pub generation: LimitPolicy,
}

impl LimiterConfig {
    pub fn policy(&self, class: LimiterClass) -> LimitPolicy {
        match class {
            LimiterClass::General => self.general,
            LimiterClass::Authentication => self.authentication,
            LimiterClass::Generation => self.generation,
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            general: LimitPolicy::new(60, Duration::from_secs(60)),
            authentication: LimitPolicy::new(10, Duration::from_secs(60)),
            generation: LimitPolicy::new(5, Duration::from_secs(60)),
        }
    }
}

/// Outcome of one [`SlidingWindowLimiter::limit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    /// Set when the store could not be consulted and the request was let
    /// through anyway.
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Reset time as epoch seconds, rounded up.
    pub fn reset_epoch_secs(&self) -> i64 {
        let secs = self.reset_at.timestamp();
        if self.reset_at.timestamp_subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn RateLimitStore>,
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    key_prefix: String,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: LimiterConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_STORE_TIMEOUT,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
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

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    fn bucket_key(&self, identifier: &str, class: LimiterClass) -> String {
        format!("{}:{}:{}", self.key_prefix, class.as_str(), identifier)
    }

    /// Counts one request against `identifier`'s bucket for `class`.
    ///
    /// If the store is unreachable or slow the request is allowed (fail
    /// open) and the decision is marked `degraded`.
    pub async fn limit(&self, identifier: &str, class: LimiterClass) -> RateLimitDecision {
        let policy = self.config.policy(class);
        let now = self.clock.now();
        let key = self.bucket_key(identifier, class);

        let counted = match tokio::time::timeout(
            self.timeout,
            self.store.increment(&key, policy.window, now),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::TimedOut),
        };

        match counted {
            Ok(window) => {
                let allowed = window.count <= policy.max_requests;
                if !allowed {
                    debug!(
                        "Rate limit hit for {} on {} ({} > {})",
                        identifier, class, window.count, policy.max_requests
                    );
                }
                RateLimitDecision {
                    allowed,
                    limit: policy.max_requests,
                    remaining: policy.max_requests.saturating_sub(window.count),
                    reset_at: window.expires_at,
                    degraded: false,
                }
            }
            Err(err) => {
                warn!(
                    "Rate limit store unavailable for {} on {}: {}; failing open",
                    identifier, class, err
                );
                let window = chrono::Duration::from_std(policy.window)
                    .unwrap_or_else(|_| chrono::Duration::seconds(60));
                RateLimitDecision {
                    allowed: true,
                    limit: policy.max_requests,
                    remaining: policy.max_requests,
                    reset_at: now + window,
                    degraded: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;

    fn limiter(config: LimiterConfig) -> (SlidingWindowLimiter, ManualClock) {
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let limiter = SlidingWindowLimiter::new(Arc::new(MemoryRateLimitStore::new()), config)
            .with_clock(Arc::new(clock.clone()));
        (limiter, clock)
    }

    fn ten_per_ten_seconds() -> LimiterConfig {
        LimiterConfig {
            general: LimitPolicy::new(10, Duration::from_secs(10)),
            ..LimiterConfig::default()
        }
    }

    #[tokio::test]
    async fn test_window_admits_budget_then_denies_then_resets() {
        let (limiter, clock) = limiter(ten_per_ten_seconds());
        let start = clock.now();

        for expected_remaining in (0..10).rev() {
            let decision = limiter.limit("ip:1.2.3.4", LimiterClass::General).await;
            assert!(decision.allowed);
            assert_eq!(decision.limit, 10);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.reset_at, start + chrono::Duration::seconds(10));
            clock.advance(chrono::Duration::milliseconds(500));
        }

        let denied = limiter.limit("ip:1.2.3.4", LimiterClass::General).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(!denied.degraded);

        clock.set(start + chrono::Duration::seconds(10));
        let fresh = limiter.limit("ip:1.2.3.4", LimiterClass::General).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 9);
    }

    #[tokio::test]
    async fn test_boundary_burst_can_admit_twice_the_budget() {
        // Fixed buckets: 1 request opens the bucket, 9 more land just before
        // it expires, and 10 more land just after. 19 of the 20 admitted
        // requests fall within half a second; 2x the budget is the bound.
        let (limiter, clock) = limiter(ten_per_ten_seconds());
        let start = clock.now();

        assert!(limiter.limit("ip:9.9.9.9", LimiterClass::General).await.allowed);
        clock.set(start + chrono::Duration::milliseconds(9_500));
        let mut admitted = 1;
        for _ in 0..9 {
            if limiter.limit("ip:9.9.9.9", LimiterClass::General).await.allowed {
                admitted += 1;
            }
        }
        clock.set(start + chrono::Duration::seconds(10));
        for _ in 0..10 {
            if limiter.limit("ip:9.9.9.9", LimiterClass::General).await.allowed {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 2 * 10);
    }

    #[tokio::test]
    async fn test_classes_and_identifiers_are_independent() {
        let config = LimiterConfig {
            general: LimitPolicy::new(3, Duration::from_secs(60)),
            authentication: LimitPolicy::new(2, Duration::from_secs(60)),
            generation: LimitPolicy::new(1, Duration::from_secs(60)),
        };
        let (limiter, _) = limiter(config);

        assert!(limiter.limit("ip:a", LimiterClass::Generation).await.allowed);
        assert!(!limiter.limit("ip:a", LimiterClass::Generation).await.allowed);

        // Other classes for the same identifier are untouched
        let general = limiter.limit("ip:a", LimiterClass::General).await;
        assert!(general.allowed);
        assert_eq!(general.remaining, 2);
        let auth = limiter.limit("ip:a", LimiterClass::Authentication).await;
        assert_eq!(auth.remaining, 1);

        // Other identifiers in the same class are untouched
        assert!(limiter.limit("ip:b", LimiterClass::Generation).await.allowed);
    }

    #[tokio::test]
    async fn test_denied_requests_still_count() {
        let config = LimiterConfig {
            general: LimitPolicy::new(1, Duration::from_secs(60)),
            ..LimiterConfig::default()
        };
        let store = MemoryRateLimitStore::new();
        let limiter = SlidingWindowLimiter::new(Arc::new(store.clone()), config);

        limiter.limit("ip:x", LimiterClass::General).await;
        limiter.limit("ip:x", LimiterClass::General).await;
        let third = store
            .increment("quill:ratelimit:general:ip:x", Duration::from_secs(60), Utc::now())
            .await
            .unwrap();
        assert_eq!(third.count, 3);
    }

    struct DownStore;

    #[async_trait]
    impl RateLimitStore for DownStore {
        async fn increment(
            &self,
            _: &str,
            _: Duration,
            _: DateTime<Utc>,
        ) -> Result<WindowCount, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    struct HungStore;

    #[async_trait]
    impl RateLimitStore for HungStore {
        async fn increment(
            &self,
            _: &str,
            _: Duration,
            _: DateTime<Utc>,
        ) -> Result<WindowCount, StoreError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_store_outage_fails_open() {
        let limiter = SlidingWindowLimiter::new(Arc::new(DownStore), LimiterConfig::default());
        let decision = limiter.limit("ip:1.1.1.1", LimiterClass::Generation).await;
        assert!(decision.allowed);
        assert!(decision.degraded);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.remaining, 5);
    }

    #[tokio::test]
    async fn test_store_timeout_fails_open() {
        let limiter = SlidingWindowLimiter::new(Arc::new(HungStore), LimiterConfig::default())
            .with_timeout(Duration::from_millis(10));
        let decision = limiter.limit("ip:1.1.1.1", LimiterClass::General).await;
        assert!(decision.allowed);
        assert!(decision.degraded);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            LimitPolicy::parse("60/60"),
            Some(LimitPolicy::new(60, Duration::from_secs(60)))
        );
        assert_eq!(
            LimitPolicy::parse(" 5 / 30 "),
            Some(LimitPolicy::new(5, Duration::from_secs(30)))
        );
        assert_eq!(LimitPolicy::parse("0/60"), None);
        assert_eq!(LimitPolicy::parse("10"), None);
        assert_eq!(LimitPolicy::parse("ten/60"), None);
    }

    #[test]
    fn test_reset_rounds_up_to_whole_seconds() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 1,
            remaining: 0,
            reset_at: DateTime::from_timestamp(100, 1).unwrap(),
            degraded: false,
        };
        assert_eq!(decision.reset_epoch_secs(), 101);
    }
}
