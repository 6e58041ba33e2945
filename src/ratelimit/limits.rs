//! Rate limit threshold tables.
//!
//! The single source of truth for per-window thresholds. The limiter never
//! hardcodes a number; it looks everything up here. The table is built once
//! from configuration and shared immutably.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;

use super::keys::Window;

/// Billable message type, the second key of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Sms,
    Mms,
}

impl MessageType {
    /// Get the string name of this message type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Mms => "mms",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tenant billing tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantTier {
    #[default]
    Free,
    Paid,
}

impl TenantTier {
    /// Get the string name of this tier.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }
}

/// Thresholds for the three counting windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimits {
    pub minute: u64,
    pub hour: u64,
    pub day: u64,
}

impl WindowLimits {
    /// Threshold for a single window.
    pub fn limit(&self, window: Window) -> u64 {
        match window {
            Window::Minute => self.minute,
            Window::Hour => self.hour,
            Window::Day => self.day,
        }
    }
}

/// Immutable threshold lookup, built once at startup and injected into the
/// limiter.
#[derive(Debug, Clone)]
pub struct RateLimitTable {
    entries: HashMap<(MessageType, TenantTier), WindowLimits>,
}

impl RateLimitTable {
    /// Build the table from configuration.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let mut entries = HashMap::new();
        entries.insert((MessageType::Sms, TenantTier::Free), config.sms.free);
        entries.insert((MessageType::Sms, TenantTier::Paid), config.sms.paid);
        entries.insert((MessageType::Mms, TenantTier::Free), config.mms.free);
        entries.insert((MessageType::Mms, TenantTier::Paid), config.mms.paid);
        Self { entries }
    }

    /// Look up thresholds for a (message type, tier).
    pub fn limits(&self, message_type: MessageType, tier: TenantTier) -> WindowLimits {
        self.entries[&(message_type, tier)]
    }
}

impl Default for RateLimitTable {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_tiers() {
        let table = RateLimitTable::default();

        let free = table.limits(MessageType::Sms, TenantTier::Free);
        let paid = table.limits(MessageType::Sms, TenantTier::Paid);
        assert!(paid.minute > free.minute);
        assert!(paid.day > free.day);
    }

    #[test]
    fn test_windows_independently_configurable() {
        let config = RateLimitConfig {
            sms: crate::config::TierLimits {
                free: WindowLimits { minute: 1, hour: 999, day: 5 },
                paid: WindowLimits { minute: 2, hour: 2, day: 2 },
            },
            ..RateLimitConfig::default()
        };
        let table = RateLimitTable::from_config(&config);

        let limits = table.limits(MessageType::Sms, TenantTier::Free);
        assert_eq!(limits.limit(Window::Minute), 1);
        assert_eq!(limits.limit(Window::Hour), 999);
        assert_eq!(limits.limit(Window::Day), 5);
    }

    #[test]
    fn test_mms_limits_distinct_from_sms() {
        let table = RateLimitTable::default();
        let sms = table.limits(MessageType::Sms, TenantTier::Free);
        let mms = table.limits(MessageType::Mms, TenantTier::Free);
        assert_ne!(sms, mms);
    }
}
