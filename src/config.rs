//! Environment-based service configuration.

use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Everything the service reads from the environment, with the documented
/// defaults applied. Loaded once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub allowed_domains: Vec<String>,
    pub port: u16,
    pub log_level: String,
    pub temp_dir: PathBuf,
    pub redis_url: String,
    pub database_url: String,
    pub max_concurrent_jobs: usize,
    pub job_timeout: Duration,
    pub queue_check_interval: Duration,
    pub ffmpeg_path: String,
    pub imagemagick_path: String,
    pub wordpress_api_url: String,
    pub wordpress_username: String,
    pub wordpress_app_password: String,
    pub rate_limit_per_minute: u32,
    pub max_retries: i32,
    pub retry_backoff: Vec<Duration>,
}

impl Config {
    /// Read the configuration from the environment, applying defaults for
    /// anything unset. Call [`Config::validate`] before using it.
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("API_KEY", ""),
            allowed_domains: env_csv("ALLOWED_DOMAINS"),
            port: env_parse("PORT", 3000),
            log_level: env_string("LOG_LEVEL", "info"),
            temp_dir: PathBuf::from(env_string("TEMP_DIR", "/tmp/compression")),
            redis_url: env_string("REDIS_URL", "redis://localhost:6379"),
            database_url: env_string("DATABASE_URL", ""),
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS", 5),
            job_timeout: Duration::from_secs(env_parse("JOB_TIMEOUT", 3600)),
            queue_check_interval: Duration::from_secs(env_parse("QUEUE_CHECK_INTERVAL", 5)),
            ffmpeg_path: env_string("FFMPEG_PATH", "/usr/bin/ffmpeg"),
            imagemagick_path: env_string("IMAGEMAGICK_PATH", "/usr/bin/convert"),
            wordpress_api_url: env_string("WORDPRESS_API_URL", ""),
            wordpress_username: env_string("WORDPRESS_USERNAME", ""),
            wordpress_app_password: env_string("WORDPRESS_APP_PASSWORD", ""),
            rate_limit_per_minute: env_parse("RATE_LIMIT_REQUESTS_PER_MINUTE", 10),
            max_retries: env_parse("MAX_RETRIES", 3),
            retry_backoff: env_backoff("RETRY_BACKOFF_SECONDS", &[60, 300, 900]),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            bail!("DATABASE_URL is required");
        }
        if self.api_key.is_empty() {
            warn!("API_KEY is not set; API authentication is disabled");
        }
        if self.allowed_domains.is_empty() {
            warn!("ALLOWED_DOMAINS is not set; domain whitelisting is disabled");
        }
        Ok(())
    }

    /// Backoff delay before re-enqueueing a job that has already failed
    /// `retry_count` times. The last ladder entry repeats.
    pub fn backoff_for(&self, retry_count: i32) -> Duration {
        let index = (retry_count.max(0) as usize).min(self.retry_backoff.len() - 1);
        self.retry_backoff[index]
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_csv(key: &str) -> Vec<String> {
    env::var(key)
        .map(|value| {
            value
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_backoff(key: &str, default: &[u64]) -> Vec<Duration> {
    let seconds: Vec<u64> = env::var(key)
        .map(|value| {
            value
                .split(',')
                .filter_map(|part| part.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();

    let seconds = if seconds.is_empty() { default.to_vec() } else { seconds };
    seconds.into_iter().map(Duration::from_secs).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            api_key: String::new(),
            allowed_domains: vec![],
            port: 3000,
            log_level: "info".into(),
            temp_dir: PathBuf::from("/tmp/compression"),
            redis_url: "redis://localhost:6379".into(),
            database_url: "sqlite::memory:".into(),
            max_concurrent_jobs: 5,
            job_timeout: Duration::from_secs(3600),
            queue_check_interval: Duration::from_secs(5),
            ffmpeg_path: "/usr/bin/ffmpeg".into(),
            imagemagick_path: "/usr/bin/convert".into(),
            wordpress_api_url: String::new(),
            wordpress_username: String::new(),
            wordpress_app_password: String::new(),
            rate_limit_per_minute: 10,
            max_retries: 3,
            retry_backoff: [60, 300, 900].map(Duration::from_secs).to_vec(),
        }
    }

    #[test]
    fn backoff_ladder_clamps_to_last_entry() {
        let config = test_config();
        assert_eq!(config.backoff_for(0), Duration::from_secs(60));
        assert_eq!(config.backoff_for(1), Duration::from_secs(300));
        assert_eq!(config.backoff_for(2), Duration::from_secs(900));
        assert_eq!(config.backoff_for(7), Duration::from_secs(900));
    }

    #[test]
    fn missing_database_url_fails_validation() {
        let mut config = test_config();
        config.database_url.clear();
        assert!(config.validate().is_err());
    }
}
