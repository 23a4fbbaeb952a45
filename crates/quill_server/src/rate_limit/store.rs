use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Counter state of one bucket right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Requests counted in this bucket, including the one just added.
    pub count: u64,
    /// When the bucket expires and counting starts over.
    pub expires_at: DateTime<Utc>,
}

/// Shared counter store for rate-limit buckets.
///
/// Every server process must see the same counters, so production
/// deployments back this with an external store (see the Redis adapter in
/// the API server). Increment and expiry handling must be one atomic step.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Adds one to the bucket at `key`. On the bucket's first increment, or if
    /// it somehow has no expiry, the bucket is set to expire `window` after
    /// `now`.
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowCount, StoreError>;
}
