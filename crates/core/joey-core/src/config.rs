//! Configuration management and environment variable loading

use crate::resilience::RetryConfig;
use crate::{JoeyError, Result};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Load environment variables from .env file
///
/// This function loads variables from a .env file in the current directory
/// or a parent directory. It's safe to call multiple times.
///
/// # Example
///
/// ```no_run
/// use joey_core::load_env;
///
/// load_env().ok();
/// let base = std::env::var("JOEY_BACKEND_URL").unwrap_or_default();
/// ```
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("Loaded environment from: {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::LineParse(line, pos)) => Err(JoeyError::config(format!(
            "Failed to parse .env file at line {}, position {}",
            line, pos
        ))),
        Err(dotenvy::Error::Io(_)) => {
            tracing::debug!("No .env file found - using system environment variables only");
            Ok(())
        }
        Err(e) => Err(JoeyError::config(format!("Failed to load .env file: {}", e))),
    }
}

/// Load environment variables from a specific file
pub fn load_env_from_path<P: AsRef<Path>>(path: P) -> Result<()> {
    match dotenvy::from_path(path.as_ref()) {
        Ok(_) => {
            tracing::info!("Loaded environment from: {}", path.as_ref().display());
            Ok(())
        }
        Err(e) => Err(JoeyError::config(format!(
            "Failed to load {} environment file: {}",
            path.as_ref().display(),
            e
        ))),
    }
}

/// Get optional environment variable with default
pub fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get environment variable as boolean
pub fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Get environment variable as integer
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Get environment variable as float
pub fn get_env_float(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

/// Default gateway base URL
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
/// Default model name
pub const DEFAULT_MODEL: &str = "qwen2.5-coder:7b";
/// Default provider name
pub const DEFAULT_PROVIDER: &str = "ollama";
/// Default health endpoint
pub const DEFAULT_HEALTH_PATH: &str = "/v1/health";

/// Chat client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Gateway base URL, no trailing slash
    pub backend_url: String,
    /// Model name sent with every payload
    pub model: String,
    /// Provider name sent with every payload
    pub provider: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Health endpoint path
    pub health_path: String,
    /// Interval between health probes
    pub health_interval: Duration,
    /// Inactivity window for the streaming attempt, reset on every chunk
    pub stream_idle_timeout: Duration,
    /// Non-streaming fallback attempts and their backoff
    pub fallback: RetryConfig,
    /// Timeout for one non-streaming request
    pub request_timeout: Duration,
    /// Upper bound on accumulated reply text
    pub max_response_size: usize,
    /// Derive a title after the first exchange
    pub auto_title: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            temperature: 0.2,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            health_interval: Duration::from_secs(10),
            stream_idle_timeout: Duration::from_millis(6000),
            fallback: RetryConfig::default(),
            request_timeout: Duration::from_secs(60),
            max_response_size: 10 * 1024 * 1024,
            auto_title: true,
        }
    }
}

impl ClientConfig {
    /// Read configuration from `JOEY_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let fallback = RetryConfig {
            max_retries: get_env_int("JOEY_FALLBACK_ATTEMPTS", defaults.fallback.max_retries),
            initial_delay: Duration::from_millis(get_env_int(
                "JOEY_BACKOFF_INITIAL_MS",
                defaults.fallback.initial_delay.as_millis() as u64,
            )),
            ..defaults.fallback.clone()
        };

        Self {
            backend_url: get_env_or("JOEY_BACKEND_URL", &defaults.backend_url)
                .trim_end_matches('/')
                .to_string(),
            model: get_env_or("JOEY_MODEL", &defaults.model),
            provider: get_env_or("JOEY_PROVIDER", &defaults.provider),
            temperature: get_env_float("JOEY_TEMPERATURE", defaults.temperature),
            health_path: get_env_or("JOEY_HEALTH_PATH", &defaults.health_path),
            health_interval: Duration::from_secs(get_env_int(
                "JOEY_HEALTH_INTERVAL_SECS",
                defaults.health_interval.as_secs(),
            )),
            stream_idle_timeout: Duration::from_millis(get_env_int(
                "JOEY_STREAM_IDLE_TIMEOUT_MS",
                defaults.stream_idle_timeout.as_millis() as u64,
            )),
            fallback,
            request_timeout: Duration::from_secs(get_env_int(
                "JOEY_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            max_response_size: get_env_int("JOEY_MAX_RESPONSE_BYTES", defaults.max_response_size),
            auto_title: get_env_bool("JOEY_AUTO_TITLE", defaults.auto_title),
        }
    }

    /// Point the configuration at another backend
    pub fn with_backend(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Check the configuration before any network use
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.backend_url)?;
        validate_model_name(&self.model)?;

        if self.provider.trim().is_empty() {
            return Err(JoeyError::config("Provider cannot be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(JoeyError::config(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if !self.health_path.starts_with('/') {
            return Err(JoeyError::config(format!(
                "Health path must start with '/': '{}'",
                self.health_path
            )));
        }
        if self.health_interval.is_zero()
            || self.stream_idle_timeout.is_zero()
            || self.request_timeout.is_zero()
        {
            return Err(JoeyError::config("Intervals and timeouts must be non-zero"));
        }
        if self.max_response_size == 0 {
            return Err(JoeyError::config("max_response_size must be non-zero"));
        }

        Ok(())
    }
}

/// Validate a backend base URL
pub fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(JoeyError::config("Base URL cannot be empty"));
    }
    if url.len() > 2048 {
        return Err(JoeyError::config("URL is too long (max 2048 characters)"));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(JoeyError::config(format!(
            "Invalid URL format: '{}'. Must start with http:// or https://",
            url
        )));
    }
    Ok(())
}

/// Validate model name (basic sanitization)
pub fn validate_model_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(JoeyError::config("Model name cannot be empty"));
    }
    if name.len() > 256 {
        return Err(JoeyError::config("Model name is too long (max 256 characters)"));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(JoeyError::config("Model name contains control characters"));
    }
    Ok(())
}
