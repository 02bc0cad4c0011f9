use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client as RedisClient, Script};
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{RateLimitError, RateLimiter};

const KEY_PREFIX: &str = "grant-eligibility:ratelimit";

/// Sliding-window log in a sorted set. Trims, counts and records in one atomic step.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
if redis.call('ZCARD', key) >= limit then
  return 0
end
redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return 1
"#;

/// Rate limiter whose counters live in Redis, so every instance shares one window per client.
pub struct RedisRateLimiter {
    client: RedisClient,
    /// Connected on first use and shared by every request; reconnects on its own.
    connection: OnceCell<ConnectionManager>,
    script: Script,
    max_requests: usize,
    window: Duration,
}

impl RedisRateLimiter {
    pub fn new(client: RedisClient, max_requests: usize, window: Duration) -> Self {
        Self {
            client,
            connection: OnceCell::new(),
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            max_requests,
            window,
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, RateLimitError> {
        let manager = self
            .connection
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }
}

fn window_key(key: &str) -> String {
    format!("{KEY_PREFIX}:{key}")
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn admit(&self, key: &str) -> Result<bool, RateLimitError> {
        let mut con = self.connection().await?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_ms = self.window.as_millis() as i64;

        let admitted: i32 = self
            .script
            .key(window_key(key))
            .arg(now_ms)
            .arg(window_ms)
            .arg(self.max_requests)
            .arg(Uuid::new_v4().to_string())
            .invoke_async(&mut con)
            .await?;

        Ok(admitted == 1)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
