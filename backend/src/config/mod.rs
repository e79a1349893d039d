use std::time::Duration;

use config::{Config, ConfigError, Environment};
use dotenv::dotenv;
use serde::Deserialize;

use crate::store::RetryPolicy;

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub pool_size: u32,
    pub db_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub jwt_secret: String,
    pub jwt_ttl_hours: u64,
    pub code_ttl_secs: i64,
    pub flat_threshold: i64,
    pub notify_frequency_secs: u64,
    pub notify_timeout_secs: u64,
    #[serde(default)]
    pub telegram_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    pub telegram_api_url: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env file if present
        Self::from_env(Environment::default())
    }

    fn from_env(env: Environment) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .set_default("port", 8080)?
            .set_default("pool_size", 10)?
            .set_default("db_timeout_ms", 5000)?
            .set_default("retry_attempts", 3)?
            .set_default("retry_backoff_ms", 100)?
            .set_default("jwt_ttl_hours", 24)?
            .set_default("code_ttl_secs", 300)?
            .set_default("flat_threshold", 10)?
            .set_default("notify_frequency_secs", 10)?
            .set_default("notify_timeout_secs", 5)?
            .set_default("telegram_api_url", "https://api.telegram.org")?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("retry_attempts", u64::from(self.retry_attempts)),
            ("notify_frequency_secs", self.notify_frequency_secs),
            ("notify_timeout_secs", self.notify_timeout_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Message(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.db_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn code_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.code_ttl_secs)
    }

    pub fn notify_frequency(&self) -> Duration {
        Duration::from_secs(self.notify_frequency_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    /// Bot token and chat id, when both are configured.
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.telegram_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.as_str(), chat.as_str()))
            }
            _ => None,
        }
    }
}

// Secrets stay out of the startup log.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("pool_size", &self.pool_size)
            .field("db_timeout_ms", &self.db_timeout_ms)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("jwt_ttl_hours", &self.jwt_ttl_hours)
            .field("code_ttl_secs", &self.code_ttl_secs)
            .field("flat_threshold", &self.flat_threshold)
            .field("notify_frequency_secs", &self.notify_frequency_secs)
            .field("notify_timeout_secs", &self.notify_timeout_secs)
            .field("telegram", &self.telegram().is_some())
            .finish_non_exhaustive()
    }
}
