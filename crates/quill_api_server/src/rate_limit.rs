//! Redis-backed rate-limit counters shared by every server process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_server::error::StoreError;
use quill_server::rate_limit::{RateLimitStore, WindowCount};
use redis::Script;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, warn};

/// Increment the bucket and start its window on the first hit. A key left
/// without a TTL (e.g. by a crashed writer) gets one on the next hit.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

#[derive(Clone)]
pub struct RedisRateLimitStore {
    connection_manager: ConnectionManager,
    script: Script,
}

impl RedisRateLimitStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client for rate limiting: {}", e);
            StoreError::Unavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!("Failed to connect to Redis for rate limiting: {}", e);
            StoreError::Unavailable(format!("Failed to connect to Redis: {}", e))
        })?;

        let mut conn = connection_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to ping Redis: {}", e)))?;

        debug!("Connected to Redis for rate limiting");

        Ok(Self {
            connection_manager,
            script: Script::new(INCREMENT_SCRIPT),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowCount, StoreError> {
        let mut conn = self.connection_manager.clone();
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);

        let (count, pttl): (u64, i64) = self
            .script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(window_count(count, pttl, window_ms, now))
    }
}

/// Converts the script's reply into a [`WindowCount`]. A non-positive TTL
/// means the key expired between the increment and the TTL read; the full
/// window is reported then.
fn window_count(count: u64, pttl: i64, window_ms: u64, now: DateTime<Utc>) -> WindowCount {
    let remaining_ms = if pttl > 0 {
        pttl
    } else {
        i64::try_from(window_ms).unwrap_or(i64::MAX)
    };
    WindowCount {
        count,
        expires_at: now + chrono::Duration::milliseconds(remaining_ms),
    }
}
