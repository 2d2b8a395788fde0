// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search backend API settings
    #[serde(default)]
    pub search: SearchApiConfig,

    /// Polling schedule and behavior
    #[serde(default)]
    pub polling: PollingConfig,

    /// Notification channels and digest
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Persistent store backend
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.search.base_url.trim().is_empty() {
            return Err(AppError::validation("search.base_url is empty"));
        }
        if self.search.timeout_secs == 0 {
            return Err(AppError::validation("search.timeout_secs must be > 0"));
        }
        if self.search.max_attempts == 0 {
            return Err(AppError::validation("search.max_attempts must be > 0"));
        }
        if self.search.max_pages == 0 {
            return Err(AppError::validation("search.max_pages must be > 0"));
        }
        if self.polling.cycle_minutes == 0 {
            return Err(AppError::validation("polling.cycle_minutes must be > 0"));
        }
        if self.polling.request_check_secs == 0 {
            return Err(AppError::validation(
                "polling.request_check_secs must be > 0",
            ));
        }
        if self.notify.digest.hour > 23 || self.notify.digest.minute > 59 {
            return Err(AppError::validation("notify.digest time out of range"));
        }
        if self.notify.email.enabled {
            if self.notify.email.smtp_host.trim().is_empty() {
                return Err(AppError::validation(
                    "notify.email enabled but smtp_host is empty",
                ));
            }
            if self.notify.email.recipients.is_empty() {
                return Err(AppError::validation(
                    "notify.email enabled but no recipients configured",
                ));
            }
        }
        if self.notify.slack.enabled && self.notify.slack.webhook_url.trim().is_empty() {
            return Err(AppError::validation(
                "notify.slack enabled but webhook_url is empty",
            ));
        }
        match self.storage.backend.as_str() {
            "memory" => {}
            "rest" => {
                if self.storage.rest.base_url.trim().is_empty() {
                    return Err(AppError::validation(
                        "storage.backend = rest but storage.rest.base_url is empty",
                    ));
                }
            }
            other => {
                return Err(AppError::validation(format!(
                    "unknown storage backend: {other}"
                )));
            }
        }
        Ok(())
    }
}

/// Search backend API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchApiConfig {
    /// API base URL
    #[serde(default = "defaults::search_base_url")]
    pub base_url: String,

    /// Public site used to derive canonical document URLs
    #[serde(default = "defaults::public_base_url")]
    pub public_base_url: String,

    /// Bearer token. Usually supplied via LEXWATCH_API_TOKEN.
    #[serde(default)]
    pub api_token: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Total HTTP attempts per call (first try included)
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Minimum gap between any two outbound calls, in milliseconds
    #[serde(default = "defaults::rate_limit_gap")]
    pub rate_limit_gap_ms: u64,

    /// Upper bound on result pages fetched per watch per poll
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,
}

impl Default for SearchApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::search_base_url(),
            public_base_url: defaults::public_base_url(),
            api_token: String::new(),
            timeout_secs: defaults::timeout(),
            max_attempts: defaults::max_attempts(),
            rate_limit_gap_ms: defaults::rate_limit_gap(),
            max_pages: defaults::max_pages(),
        }
    }
}

/// Polling schedule and behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "defaults::yes")]
    pub enabled: bool,

    /// Main cycle interval in minutes
    #[serde(default = "defaults::cycle_minutes")]
    pub cycle_minutes: u64,

    /// Notification dispatch interval in minutes
    #[serde(default = "defaults::dispatch_minutes")]
    pub dispatch_minutes: u64,

    /// Poll-request queue check interval in seconds
    #[serde(default = "defaults::request_check_secs")]
    pub request_check_secs: u64,

    /// Fetch extended metadata for newly matched judgments
    #[serde(default)]
    pub fetch_details: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::yes(),
            cycle_minutes: defaults::cycle_minutes(),
            dispatch_minutes: defaults::dispatch_minutes(),
            request_check_secs: defaults::request_check_secs(),
            fetch_details: false,
        }
    }
}

/// Notification channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub slack: SlackConfig,

    /// Delivery attempts per match before it is permanently parked
    #[serde(default = "defaults::retry_limit")]
    pub retry_limit: u32,

    /// Maximum pending matches selected per dispatch run
    #[serde(default = "defaults::batch_limit")]
    pub batch_limit: usize,

    #[serde(default)]
    pub digest: DigestConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            email: EmailConfig::default(),
            slack: SlackConfig::default(),
            retry_limit: defaults::retry_limit(),
            batch_limit: defaults::batch_limit(),
            digest: DigestConfig::default(),
        }
    }
}

/// SMTP email channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub username: String,

    /// Usually supplied via LEXWATCH_SMTP_PASSWORD
    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub from_address: String,

    #[serde(default = "defaults::yes")]
    pub use_starttls: bool,

    #[serde(default)]
    pub recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: defaults::smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            use_starttls: defaults::yes(),
            recipients: Vec::new(),
        }
    }
}

/// Slack incoming-webhook channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Usually supplied via LEXWATCH_SLACK_WEBHOOK
    #[serde(default)]
    pub webhook_url: String,
}

/// Daily digest settings. Local time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default = "defaults::yes")]
    pub enabled: bool,

    #[serde(default = "defaults::digest_hour")]
    pub hour: u32,

    #[serde(default)]
    pub minute: u32,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::yes(),
            hour: defaults::digest_hour(),
            minute: 0,
        }
    }
}

/// Persistent store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "rest"
    #[serde(default = "defaults::storage_backend")]
    pub backend: String,

    #[serde(default)]
    pub rest: RestConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: defaults::storage_backend(),
            rest: RestConfig::default(),
        }
    }
}

/// REST store backend (PostgREST conventions).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestConfig {
    #[serde(default)]
    pub base_url: String,

    /// Service key. Usually supplied via LEXWATCH_SERVICE_KEY.
    #[serde(default)]
    pub service_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Default values for configuration.
mod defaults {
    pub fn search_base_url() -> String {
        "https://api.indiankanoon.org".to_string()
    }

    pub fn public_base_url() -> String {
        "https://indiankanoon.org".to_string()
    }

    pub fn timeout() -> u64 {
        30
    }

    pub fn max_attempts() -> u32 {
        3
    }

    pub fn rate_limit_gap() -> u64 {
        2000
    }

    pub fn max_pages() -> u32 {
        5
    }

    pub fn yes() -> bool {
        true
    }

    pub fn cycle_minutes() -> u64 {
        30
    }

    pub fn dispatch_minutes() -> u64 {
        10
    }

    pub fn request_check_secs() -> u64 {
        30
    }

    pub fn retry_limit() -> u32 {
        3
    }

    pub fn batch_limit() -> usize {
        50
    }

    pub fn smtp_port() -> u16 {
        587
    }

    pub fn digest_hour() -> u32 {
        9
    }

    pub fn storage_backend() -> String {
        "memory".to_string()
    }

    pub fn log_level() -> String {
        "info".to_string()
    }
}
