// Client configuration shared by the dispatcher, session store, restorer and wizard

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid base url: {0}")]
    InvalidBaseUrl(String),

    #[error("Timeout must be greater than zero")]
    ZeroTimeout,

    #[error("Session ttl must be a positive number of seconds, got {0}")]
    InvalidSessionTtl(i64),
}

// Endpoints that never carry the bearer token
pub const LOGIN_ENDPOINT: &str = "/Auth/Login";
pub const REGISTER_ENDPOINT: &str = "/Auth/Register";
pub const FORGOT_PASSWORD_ENDPOINT: &str = "/Auth/ForgotPassword";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub simulated_delay_ms: u64,
    pub session_ttl_secs: i64,
    pub min_splash_ms: u64,
    pub payment_delay_ms: u64,
    pub public_endpoints: Vec<String>,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com/api".to_string(),
            timeout_ms: 30_000,
            simulated_delay_ms: 500,
            session_ttl_secs: 24 * 60 * 60,
            min_splash_ms: 1_500,
            payment_delay_ms: 2_000,
            public_endpoints: vec![
                LOGIN_ENDPOINT.to_string(),
                REGISTER_ENDPOINT.to_string(),
                FORGOT_PASSWORD_ENDPOINT.to_string(),
            ],
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.session_ttl_secs <= 0 || self.session_ttl().is_none() {
            return Err(ConfigError::InvalidSessionTtl(self.session_ttl_secs));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    // None when the value does not fit a chrono duration
    pub fn session_ttl(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_seconds(self.session_ttl_secs)
    }

    pub fn min_splash(&self) -> Duration {
        Duration::from_millis(self.min_splash_ms)
    }

    pub fn payment_delay(&self) -> Duration {
        Duration::from_millis(self.payment_delay_ms)
    }
}

// Retry settings. Nothing in the dispatcher consumes these yet: the backend
// has not documented which failures are safe to repeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}
