//! Counter key generation.
//!
//! Keys are pure functions of (tenant, message type, window) and carry no
//! timestamp component: freshness is enforced by the store's TTL, so the
//! same logical window always maps to the same key with no wall-clock
//! rounding seams between windows.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::limits::MessageType;

/// Key namespace prefix, shared with reset/scan operations.
const KEY_PREFIX: &str = "rl";

/// A fixed-duration counting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    /// All windows in ascending granularity. Violations are reported for
    /// the first (smallest) violated window in this order.
    pub const ALL: [Window; 3] = [Window::Minute, Window::Hour, Window::Day];

    /// Window length in seconds.
    pub fn seconds(&self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    /// Window length as a duration.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    /// Get the string name of this window.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the counter key for one (tenant, message type, window).
pub fn counter_key(tenant_id: &str, message_type: MessageType, window: Window) -> String {
    format!(
        "{KEY_PREFIX}:{tenant_id}:{}:{}",
        message_type.name(),
        window.name()
    )
}

/// Prefix covering every counter belonging to a (tenant, message type).
pub fn counter_prefix(tenant_id: &str, message_type: MessageType) -> String {
    format!("{KEY_PREFIX}:{tenant_id}:{}:", message_type.name())
}
