use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::ratelimit::{TenantTier, WindowLimits};

/// Root configuration for msggate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Rate limit thresholds per message type and tier
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Per-tenant overrides, keyed by tenant id
    #[serde(default)]
    pub tenants: HashMap<String, TenantConfig>,

    /// Tier applied to tenants without an override
    #[serde(default)]
    pub default_tier: TenantTier,

    /// Consent policy settings
    #[serde(default)]
    pub consent: ConsentConfig,

    /// Outbound dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Rate limit thresholds, each window independently configurable
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// SMS thresholds per tier
    #[serde(default = "default_sms_limits")]
    pub sms: TierLimits,

    /// MMS thresholds per tier
    #[serde(default = "default_mms_limits")]
    pub mms: TierLimits,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sms: default_sms_limits(),
            mms: default_mms_limits(),
        }
    }
}

/// Thresholds for each tenant tier
#[derive(Debug, Clone, Deserialize)]
pub struct TierLimits {
    pub free: WindowLimits,
    pub paid: WindowLimits,
}

fn default_sms_limits() -> TierLimits {
    TierLimits {
        free: WindowLimits { minute: 5, hour: 100, day: 500 },
        paid: WindowLimits { minute: 60, hour: 1_000, day: 10_000 },
    }
}

fn default_mms_limits() -> TierLimits {
    TierLimits {
        free: WindowLimits { minute: 2, hour: 40, day: 200 },
        paid: WindowLimits { minute: 30, hour: 500, day: 5_000 },
    }
}

/// Per-tenant settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantConfig {
    /// Billing tier for rate limits
    #[serde(default)]
    pub tier: TenantTier,

    /// Gate transactional sends on consent as well as marketing ones.
    /// Marketing sends are always gated.
    #[serde(default)]
    pub require_transactional_consent: bool,
}

/// Consent policy settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentConfig {
    /// Months an opt-in stays valid without an explicit expiry
    #[serde(default = "default_validity_months")]
    pub validity_months: u32,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            validity_months: default_validity_months(),
        }
    }
}

fn default_validity_months() -> u32 {
    18
}

/// Outbound dispatch settings
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Maximum delivery attempts before a failure is surfaced
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Gateway send timeout; a timeout counts as a retryable failure
    #[serde(default = "default_gateway_timeout", with = "humantime_serde")]
    pub gateway_timeout: Duration,

    /// Job name used when enqueueing retries
    #[serde(default = "default_retry_job")]
    pub retry_job: String,

    /// Priority for retry jobs
    #[serde(default = "default_retry_priority")]
    pub retry_priority: u8,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            gateway_timeout: default_gateway_timeout(),
            retry_job: default_retry_job(),
            retry_priority: default_retry_priority(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_gateway_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_job() -> String {
    "message_retry".to_string()
}

fn default_retry_priority() -> u8 {
    5
}
