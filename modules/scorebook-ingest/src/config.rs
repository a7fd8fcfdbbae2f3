use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub kafka_host: String,
    pub redis_dsn: String,
    pub kafka_timeout: Duration,
    pub kafka_attempts: i32,
}

impl Config {
    /// Load configuration, optionally pulling a `.env` file into the
    /// environment first. A `.env` that exists but cannot be read is a hard
    /// startup error; a missing `KAFKA_HOST` likewise.
    pub fn load(env_filename: Option<&Path>) -> Result<Self> {
        if let Some(path) = env_filename {
            dotenvy::from_filename(path)
                .with_context(|| format!("error loading {} file", path.display()))?;
        }

        let kafka_timeout = env::var("KAFKA_TIMEOUT")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|&seconds| seconds != 0)
            .unwrap_or(10);

        let kafka_attempts = env::var("KAFKA_ATTEMPTS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);

        let kafka_host = env::var("KAFKA_HOST").unwrap_or_default();
        if kafka_host.is_empty() {
            bail!("empty KAFKA_HOST");
        }

        Ok(Self {
            kafka_host,
            redis_dsn: env::var("REDIS_DSN").unwrap_or_default(),
            kafka_timeout: Duration::from_secs(kafka_timeout),
            kafka_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test body: the cases share process-global env vars.
    #[test]
    fn load_reads_environment() {
        env::remove_var("KAFKA_HOST");
        env::remove_var("KAFKA_TIMEOUT");
        env::remove_var("KAFKA_ATTEMPTS");
        env::remove_var("REDIS_DSN");

        // missing KAFKA_HOST is fatal
        assert!(Config::load(None).is_err());

        // unreadable env file is fatal even with a valid environment
        env::set_var("KAFKA_HOST", "kafka:9092");
        assert!(Config::load(Some(Path::new("/nonexistent/.env"))).is_err());

        // defaults
        env::set_var("REDIS_DSN", "redis://localhost:6379/0");
        let config = Config::load(None).unwrap();
        assert_eq!(config.kafka_host, "kafka:9092");
        assert_eq!(config.redis_dsn, "redis://localhost:6379/0");
        assert_eq!(config.kafka_timeout, Duration::from_secs(10));
        assert_eq!(config.kafka_attempts, 0);

        // explicit values; zero and garbage timeouts fall back to the default
        env::set_var("KAFKA_TIMEOUT", "30");
        env::set_var("KAFKA_ATTEMPTS", "5");
        let config = Config::load(None).unwrap();
        assert_eq!(config.kafka_timeout, Duration::from_secs(30));
        assert_eq!(config.kafka_attempts, 5);

        env::set_var("KAFKA_TIMEOUT", "0");
        assert_eq!(
            Config::load(None).unwrap().kafka_timeout,
            Duration::from_secs(10)
        );
        env::set_var("KAFKA_TIMEOUT", "ten");
        assert_eq!(
            Config::load(None).unwrap().kafka_timeout,
            Duration::from_secs(10)
        );
    }
}
