use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo";

/// Which rate limiter backs `POST /eligibility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    /// Sliding window stored in Redis, shared across instances.
    Redis,
    /// Sliding window held in this process only.
    Memory,
    /// Every request is admitted.
    Disabled,
}

impl FromStr for RateLimitBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" | "in-memory" => Ok(Self::Memory),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => bail!("Unknown RATE_LIMIT_BACKEND '{other}' (expected redis, memory or disabled)"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub redis_url: Option<String>,
    pub rate_limit_backend: RateLimitBackend,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,
    pub run_poll_interval: Duration,
    pub run_timeout: Duration,
    pub scratch_dir: PathBuf,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let redis_url = optional_env("REDIS_URL");
        let rate_limit_backend = match optional_env("RATE_LIMIT_BACKEND") {
            Some(raw) => raw.parse::<RateLimitBackend>()?,
            None if redis_url.is_some() => RateLimitBackend::Redis,
            None => RateLimitBackend::Disabled,
        };
        if rate_limit_backend == RateLimitBackend::Redis && redis_url.is_none() {
            bail!("RATE_LIMIT_BACKEND=redis requires REDIS_URL to be set");
        }

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_base_url: optional_env("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            openai_model: optional_env("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            redis_url,
            rate_limit_backend,
            rate_limit_max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", 3)?,
            rate_limit_window: Duration::from_secs(parse_env("RATE_LIMIT_WINDOW_SECS", 60)?),
            run_poll_interval: Duration::from_millis(parse_env("RUN_POLL_INTERVAL_MS", 1000)?),
            run_timeout: Duration::from_secs(parse_env("RUN_TIMEOUT_SECS", 120)?),
            scratch_dir: optional_env("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("grant-eligibility")),
            port: parse_env("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Reads an optional variable, treating an empty value as unset.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_backend_parses_known_names() {
        assert_eq!("redis".parse::<RateLimitBackend>().unwrap(), RateLimitBackend::Redis);
        assert_eq!("Memory".parse::<RateLimitBackend>().unwrap(), RateLimitBackend::Memory);
        assert_eq!(" off ".parse::<RateLimitBackend>().unwrap(), RateLimitBackend::Disabled);
    }

    #[test]
    fn test_rate_limit_backend_rejects_unknown_name() {
        assert!("memcached".parse::<RateLimitBackend>().is_err());
    }

    #[test]
    fn test_parse_env_falls_back_to_default_when_unset() {
        let value: u64 = parse_env("GRANT_ELIGIBILITY_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
