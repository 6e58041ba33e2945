//! Multi-window, per-tenant rate limiting.
//!
//! Three cooperating pieces, leaves first:
//!
//! - [`keys`]: pure (tenant, message type, window) -> counter key mapping
//! - [`limits`]: the immutable threshold table, built from configuration
//! - [`limiter`]: orchestration against the shared [counter store](crate::store)
//!
//! ```text
//!  check_and_increment(tenant, type)
//!        │
//!        ▼
//!  ┌───────────┐   key(minute|hour|day)   ┌──────────────┐
//!  │  Limiter  │ ───────────────────────▶ │ CounterStore │ INCR+EXPIRE
//!  └───────────┘                          └──────────────┘
//!        │ limits(type, tier)
//!        ▼
//!  ┌───────────┐
//!  │   Table   │  (no hardcoded numbers anywhere else)
//!  └───────────┘
//! ```

mod keys;
mod limiter;
mod limits;

pub use keys::{counter_key, counter_prefix, Window};
pub use limiter::{RateLimitDecision, RateLimiter, UsageReport, WindowUsage};
pub use limits::{MessageType, RateLimitTable, TenantTier, WindowLimits};
