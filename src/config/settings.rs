//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on request bodies; reference images arrive inline as base64
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

/// How the `Retry-After` hint is computed for throttled clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryHintMode {
    /// Always report `retry_after_secs`
    Fixed,
    /// Report the exact time left in the client's rate window
    Remaining,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Per-client admission control
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: u32,
    #[serde(default = "default_retry_hint")]
    pub retry_hint: RetryHintMode,
    #[serde(default = "default_min_interval")]
    pub retry_after_secs: u64,
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Server-wide flood guard, independent of client identity
    #[serde(default)]
    pub global_enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_min_interval() -> u64 {
    60
}

fn default_max_in_flight() -> u32 {
    1
}

fn default_retry_hint() -> RetryHintMode {
    RetryHintMode::Fixed
}

fn default_idle_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_rps() -> u32 {
    100
}

fn default_burst() -> u32 {
    200
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Which generation provider serves `/generate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    /// Name used in user-facing messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Gemini => "Gemini",
        }
    }

    /// Conventional environment variable holding the provider's key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-image-1-mini",
            ProviderKind::Gemini => "gemini-2.5-flash-image-preview",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
        }
    }
}

/// Generation provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default = "default_image_quality")]
    pub image_quality: String,
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_timeout() -> u64 {
    120
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_image_quality() -> String {
    "low".to_string()
}

impl ProviderConfig {
    /// Configured key, falling back to the provider's conventional env var.
    /// Blank values count as missing.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(self.kind.api_key_env()).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.kind.default_model().to_string())
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("rate_limit.enabled", true)?
            .set_default("rate_limit.min_interval_secs", default_min_interval() as i64)?
            .set_default("rate_limit.max_in_flight", default_max_in_flight() as i64)?
            .set_default("provider.kind", "openai")?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (prefixed with IMAGECHAT__)
            .add_source(
                Environment::with_prefix("IMAGECHAT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if self.rate_limit.enabled {
            if self.rate_limit.min_interval_secs == 0 {
                return Err(invalid("rate_limit.min_interval_secs must be greater than 0"));
            }
            if self.rate_limit.max_in_flight == 0 {
                return Err(invalid("rate_limit.max_in_flight must be greater than 0"));
            }
            if self.rate_limit.sweep_interval_secs == 0 {
                return Err(invalid("rate_limit.sweep_interval_secs must be greater than 0"));
            }
        }

        if self.rate_limit.global_enabled
            && (self.rate_limit.requests_per_second == 0 || self.rate_limit.burst_size == 0)
        {
            return Err(invalid(
                "rate_limit.requests_per_second and rate_limit.burst_size must be greater than 0",
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(invalid("provider.timeout_secs must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Settings(config::ConfigError::Message(message.to_string()))
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: default_min_interval(),
            max_in_flight: default_max_in_flight(),
            retry_hint: default_retry_hint(),
            retry_after_secs: default_min_interval(),
            idle_ttl_secs: default_idle_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            global_enabled: false,
            requests_per_second: default_rps(),
            burst_size: default_burst(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            api_key: None,
            model: None,
            base_url: None,
            timeout_secs: default_timeout(),
            image_size: default_image_size(),
            image_quality: default_image_quality(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                max_body_bytes: default_max_body_bytes(),
            },
            rate_limit: RateLimitConfig::default(),
            provider: ProviderConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
