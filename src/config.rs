use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_IMAGE: &str = "ghcr.io/app-operator/app:latest";
pub const DEFAULT_FIELD_MANAGER: &str = "app-operator";

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Image used for label derivation when an App does not set one.
    pub default_image: String,
    /// Requeue interval after a converged pass.
    pub resync_interval: Duration,
    /// Requeue interval after a failed pass.
    pub error_requeue: Duration,
    /// Upper bound on any single API call.
    pub api_timeout: Duration,
    pub field_manager: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            default_image: DEFAULT_IMAGE.to_string(),
            resync_interval: Duration::from_secs(300),
            error_requeue: Duration::from_secs(60),
            api_timeout: Duration::from_secs(30),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(val) = lookup("APP_DEFAULT_IMAGE") {
            if val.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "APP_DEFAULT_IMAGE must not be empty".to_string(),
                ));
            }
            config.default_image = val;
        }

        if let Some(val) = lookup("APP_RESYNC_SECS") {
            config.resync_interval = parse_secs("APP_RESYNC_SECS", &val)?;
        }

        if let Some(val) = lookup("APP_ERROR_REQUEUE_SECS") {
            config.error_requeue = parse_secs("APP_ERROR_REQUEUE_SECS", &val)?;
        }

        if let Some(val) = lookup("APP_API_TIMEOUT_SECS") {
            config.api_timeout = parse_secs("APP_API_TIMEOUT_SECS", &val)?;
        }

        if let Some(val) = lookup("APP_FIELD_MANAGER") {
            config.field_manager = val;
        }

        Ok(config)
    }
}

fn parse_secs(key: &str, val: &str) -> Result<Duration> {
    match val.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(Error::InvalidConfig(format!(
            "{key} must be a positive number of seconds, got {val:?}"
        ))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
    }
}
