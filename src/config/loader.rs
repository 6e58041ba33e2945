use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::ratelimit::WindowLimits;

use super::types::{Config, TierLimits};

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_tier_limits("sms", &self.rate_limits.sms)?;
        validate_tier_limits("mms", &self.rate_limits.mms)?;

        for tenant_id in self.tenants.keys() {
            if tenant_id.trim().is_empty() {
                anyhow::bail!("tenant id must not be empty");
            }
        }

        if self.consent.validity_months == 0 {
            anyhow::bail!("consent validity must be at least one month");
        }

        if self.dispatch.max_attempts == 0 {
            anyhow::bail!("dispatch max_attempts must be at least 1");
        }

        if self.dispatch.gateway_timeout.is_zero() {
            anyhow::bail!("dispatch gateway_timeout must be non-zero");
        }

        info!("configuration validated successfully");
        Ok(())
    }
}

fn validate_tier_limits(message_type: &str, limits: &TierLimits) -> Result<()> {
    validate_window_limits(message_type, "free", &limits.free)?;
    validate_window_limits(message_type, "paid", &limits.paid)?;
    Ok(())
}

fn validate_window_limits(message_type: &str, tier: &str, limits: &WindowLimits) -> Result<()> {
    if limits.minute == 0 || limits.hour == 0 || limits.day == 0 {
        anyhow::bail!("{message_type}/{tier}: every window limit must be at least 1");
    }

    if limits.minute > limits.hour || limits.hour > limits.day {
        tracing::warn!(
            message_type,
            tier,
            minute = limits.minute,
            hour = limits.hour,
            day = limits.day,
            "window limits are not monotonic; smaller windows will never bind"
        );
    }

    Ok(())
}
