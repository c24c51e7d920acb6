// Client configuration: backend location, transport timeout and the polling retry policy

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("configuration error: {0}")]
    Invalid(String),
}

// Retry policy for the result-polling phase of a search
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step_ms: 500,
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt following `attempt` (1-based): grows linearly, no jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(attempt as u64))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    // 0 leaves the transport without a timeout
    pub timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 10_000,
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // Defaults overridden by whatever `lookup` knows about
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("TOUR_API_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = lookup("TOUR_API_TIMEOUT_MS") {
            config.timeout_ms = parse_number("TOUR_API_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TOUR_SEARCH_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_number("TOUR_SEARCH_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("TOUR_SEARCH_BACKOFF_STEP_MS") {
            config.retry.backoff_step_ms = parse_number("TOUR_SEARCH_BACKOFF_STEP_MS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base url must not be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "at least one polling attempt is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
