// src/config.rs

//! Configuration loading utilities.
//!
//! Loads the TOML config file and applies environment overrides for secrets,
//! so tokens never have to live in the config file itself.

use std::path::Path;

use crate::error::Result;
use crate::models::Config;

/// Environment variable overriding `search.api_token`.
pub const ENV_API_TOKEN: &str = "LEXWATCH_API_TOKEN";
/// Environment variable overriding `notify.email.password`.
pub const ENV_SMTP_PASSWORD: &str = "LEXWATCH_SMTP_PASSWORD";
/// Environment variable overriding `notify.slack.webhook_url`.
pub const ENV_SLACK_WEBHOOK: &str = "LEXWATCH_SLACK_WEBHOOK";
/// Environment variable overriding `storage.rest.service_key`.
pub const ENV_SERVICE_KEY: &str = "LEXWATCH_SERVICE_KEY";

/// Load configuration from a TOML file and apply environment overrides.
///
/// Falls back to defaults (with a warning) if the file cannot be loaded.
pub fn load_config(path: &Path) -> Config {
    let mut config = Config::load_or_default(path);
    apply_env_overrides(&mut config);
    config
}

/// Load and validate configuration, returning an error on invalid values.
pub fn load_and_validate(path: &Path) -> Result<Config> {
    let mut config = Config::load(path)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(token) = std::env::var(ENV_API_TOKEN) {
        config.search.api_token = token;
    }
    if let Ok(password) = std::env::var(ENV_SMTP_PASSWORD) {
        config.notify.email.password = password;
    }
    if let Ok(webhook) = std::env::var(ENV_SLACK_WEBHOOK) {
        config.notify.slack.webhook_url = webhook;
    }
    if let Ok(key) = std::env::var(ENV_SERVICE_KEY) {
        config.storage.rest.service_key = key;
    }
}
