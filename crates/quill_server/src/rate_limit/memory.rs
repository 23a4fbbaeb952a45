//! In-process rate-limit buckets.

use super::store::{RateLimitStore, WindowCount};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u64,
    expires_at: DateTime<Utc>,
}

/// [`RateLimitStore`] backed by a `DashMap`.
///
/// The per-key entry lock makes increment-and-expire atomic within one
/// process. Counters are not shared across processes.
#[derive(Debug, Clone, Default)]
pub struct MemoryRateLimitStore {
    buckets: Arc<DashMap<String, Bucket>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired buckets to keep the map from growing without bound.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.expires_at > now);
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowCount, StoreError> {
        let window = chrono::Duration::from_std(window)
            .map_err(|e| StoreError::Unavailable(format!("invalid window: {}", e)))?;

        let mut entry = self.buckets.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            expires_at: now + window,
        });
        let bucket = entry.value_mut();
        if bucket.expires_at <= now {
            bucket.count = 0;
            bucket.expires_at = now + window;
        }
        bucket.count += 1;

        Ok(WindowCount {
            count: bucket.count,
            expires_at: bucket.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_expires_and_restarts() {
        let store = MemoryRateLimitStore::new();
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let window = Duration::from_secs(10);

        let first = store.increment("k", window, t0).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.expires_at, t0 + chrono::Duration::seconds(10));

        let second = store
            .increment("k", window, t0 + chrono::Duration::seconds(9))
            .await
            .unwrap();
        assert_eq!(second.count, 2);
        // Expiry is fixed at the first increment
        assert_eq!(second.expires_at, first.expires_at);

        let after = t0 + chrono::Duration::seconds(10);
        let restarted = store.increment("k", window, after).await.unwrap();
        assert_eq!(restarted.count, 1);
        assert_eq!(restarted.expires_at, after + chrono::Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired_buckets() {
        let store = MemoryRateLimitStore::new();
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        store
            .increment("short", Duration::from_secs(1), t0)
            .await
            .unwrap();
        store
            .increment("long", Duration::from_secs(60), t0)
            .await
            .unwrap();

        assert_eq!(store.cleanup(t0 + chrono::Duration::seconds(5)), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_all_counted() {
        let store = MemoryRateLimitStore::new();
        let now = Utc::now();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .increment("shared", Duration::from_secs(60), now)
                    .await
                    .unwrap()
                    .count
            }));
        }
        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=50).collect::<Vec<u64>>());
    }
}
