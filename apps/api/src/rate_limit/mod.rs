//! Rate limiting for `POST /eligibility`.
//!
//! A sliding window per client identifier. The backend is chosen explicitly from
//! configuration: Redis (shared across instances), in-memory (single process), or
//! disabled (always admits).

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, RateLimitBackend};

mod redis_window;

pub use redis_window::RedisRateLimiter;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit store error: {0}")]
    Store(#[from] redis::RedisError),
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Returns `true` and records the request when `key` is under its window limit.
    async fn admit(&self, key: &str) -> Result<bool, RateLimitError>;

    /// Backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;
}

/// Admits every request.
pub struct DisabledRateLimiter;

#[async_trait]
impl RateLimiter for DisabledRateLimiter {
    async fn admit(&self, _key: &str) -> Result<bool, RateLimitError> {
        Ok(true)
    }

    fn backend(&self) -> &'static str {
        "disabled"
    }
}

/// Sliding window limiter held in process memory.
pub struct InMemoryRateLimiter {
    /// key -> timestamps of admitted requests inside the window
    requests: DashMap<String, Vec<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: DashMap::new(),
            max_requests,
            window,
        }
    }

    fn check_and_record(&self, key: &str, now: Instant) -> bool {
        let window = self.window;
        let mut entry = self.requests.entry(key.to_string()).or_default();
        let timestamps = entry.value_mut();

        timestamps.retain(|t| now.duration_since(*t) < window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }

    /// Drops keys with no requests left in the window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        self.requests.retain(|_, times| {
            times.retain(|t| now.duration_since(*t) < window);
            !times.is_empty()
        });
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn admit(&self, key: &str) -> Result<bool, RateLimitError> {
        Ok(self.check_and_record(key, Instant::now()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Builds the limiter selected by `config.rate_limit_backend`.
pub fn build_rate_limiter(config: &Config) -> Result<Arc<dyn RateLimiter>> {
    let limiter: Arc<dyn RateLimiter> = match config.rate_limit_backend {
        RateLimitBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("REDIS_URL is required for the redis backend"))?;
            let client = redis::Client::open(url)?;
            Arc::new(RedisRateLimiter::new(
                client,
                config.rate_limit_max_requests,
                config.rate_limit_window,
            ))
        }
        RateLimitBackend::Memory => {
            let limiter = Arc::new(InMemoryRateLimiter::new(
                config.rate_limit_max_requests,
                config.rate_limit_window,
            ));
            spawn_cleanup(limiter.clone(), config.rate_limit_window);
            limiter
        }
        RateLimitBackend::Disabled => {
            warn!("Rate limiting is disabled");
            Arc::new(DisabledRateLimiter)
        }
    };

    info!(
        "Rate limiter: {} ({} requests / {:?})",
        limiter.backend(),
        config.rate_limit_max_requests,
        config.rate_limit_window
    );
    Ok(limiter)
}

fn spawn_cleanup(limiter: Arc<InMemoryRateLimiter>, window: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(window.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            limiter.cleanup();
        }
    });
}
