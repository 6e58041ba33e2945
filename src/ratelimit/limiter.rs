//! Multi-window rate limiter.
//!
//! Answers "may this tenant send now?" against minute/hour/day counters in
//! the shared store. Two deliberate policies shape every code path here:
//!
//! - **No rollback.** `check_and_increment` charges all three windows before
//!   judging the result. A denied attempt stays counted; undoing the other
//!   windows would require a multi-key transaction the store does not
//!   guarantee. The violated window therefore reports the count as it stood
//!   when the limit was crossed (`current == limit`), not the overshoot.
//! - **Fail open.** Any store failure yields `allowed = true` with
//!   `remaining = 0` and a best-effort reset one window ahead. Delivery
//!   availability outranks strict enforcement during a store outage.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::store::{SharedCounterStore, StoreError};

use super::keys::{counter_key, counter_prefix, Window};
use super::limits::{MessageType, RateLimitTable, TenantTier, WindowLimits};

/// Outcome of a rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the send may proceed
    pub allowed: bool,
    /// The violated window, or `None` when allowed
    pub limit_type: Option<Window>,
    /// Count in the reported window
    pub current: u64,
    /// Threshold of the reported window
    pub limit: u64,
    /// Sends left in the reported window
    pub remaining: u64,
    /// When the reported window resets
    pub reset_time: DateTime<Utc>,
}

/// Usage for a single window.
#[derive(Debug, Clone)]
pub struct WindowUsage {
    pub current: u64,
    pub limit: u64,
    pub remaining: u64,
    /// Remaining TTL on the counter, when one exists
    pub reset_in: Option<std::time::Duration>,
}

/// Usage across all three windows.
#[derive(Debug, Clone)]
pub struct UsageReport {
    pub minute: WindowUsage,
    pub hour: WindowUsage,
    pub day: WindowUsage,
}

impl UsageReport {
    /// Usage for a single window.
    pub fn window(&self, window: Window) -> &WindowUsage {
        match window {
            Window::Minute => &self.minute,
            Window::Hour => &self.hour,
            Window::Day => &self.day,
        }
    }
}

/// Multi-window, per-tenant rate limiter.
pub struct RateLimiter {
    store: SharedCounterStore,
    table: RateLimitTable,
    tenant_tiers: HashMap<String, TenantTier>,
    default_tier: TenantTier,
}

impl RateLimiter {
    /// Create a limiter over a counter store with a threshold table.
    pub fn new(store: SharedCounterStore, table: RateLimitTable) -> Self {
        Self {
            store,
            table,
            tenant_tiers: HashMap::new(),
            default_tier: TenantTier::default(),
        }
    }

    /// Set per-tenant tier overrides.
    pub fn with_tenant_tiers(mut self, tiers: HashMap<String, TenantTier>) -> Self {
        self.tenant_tiers = tiers;
        self
    }

    /// Set the tier used for tenants without an override.
    pub fn with_default_tier(mut self, tier: TenantTier) -> Self {
        self.default_tier = tier;
        self
    }

    fn tier_for(&self, tenant_id: &str) -> TenantTier {
        self.tenant_tiers
            .get(tenant_id)
            .copied()
            .unwrap_or(self.default_tier)
    }

    /// Charge one attempt against every window and decide.
    ///
    /// All three counters are incremented atomically (each with its initial
    /// TTL in the same store operation) before any limit is judged, so a
    /// denied attempt still consumes quota everywhere.
    pub async fn check_and_increment(
        &self,
        tenant_id: &str,
        message_type: MessageType,
    ) -> RateLimitDecision {
        let limits = self.table.limits(message_type, self.tier_for(tenant_id));

        let mut counts = [0u64; 3];
        for (i, window) in Window::ALL.into_iter().enumerate() {
            let key = counter_key(tenant_id, message_type, window);
            match self
                .store
                .increment_with_expiry(&key, window.duration())
                .await
            {
                Ok(count) => counts[i] = count,
                Err(e) => return self.fail_open(tenant_id, message_type, limits, &e),
            }
        }

        let violation = Window::ALL
            .into_iter()
            .zip(counts)
            .find(|(window, count)| *count > limits.limit(*window));

        match violation {
            Some((window, count)) => {
                debug!(
                    tenant = %tenant_id,
                    message_type = %message_type,
                    window = %window,
                    limit = limits.limit(window),
                    "rate limit exceeded"
                );
                let limit = limits.limit(window);
                RateLimitDecision {
                    allowed: false,
                    limit_type: Some(window),
                    // The count as it stood when the limit was crossed; the
                    // overshooting increment itself is not reported back.
                    current: count.saturating_sub(1),
                    limit,
                    remaining: 0,
                    reset_time: self.reset_time(tenant_id, message_type, window).await,
                }
            }
            None => {
                let current = counts[0];
                let limit = limits.limit(Window::Minute);
                RateLimitDecision {
                    allowed: true,
                    limit_type: None,
                    current,
                    limit,
                    remaining: limit.saturating_sub(current),
                    reset_time: self.reset_time(tenant_id, message_type, Window::Minute).await,
                }
            }
        }
    }

    /// Pre-flight check that never mutates any counter.
    pub async fn check_only(
        &self,
        tenant_id: &str,
        message_type: MessageType,
    ) -> RateLimitDecision {
        let limits = self.table.limits(message_type, self.tier_for(tenant_id));

        let mut counts = [0u64; 3];
        for (i, window) in Window::ALL.into_iter().enumerate() {
            let key = counter_key(tenant_id, message_type, window);
            match self.store.get(&key).await {
                Ok(count) => counts[i] = count.unwrap_or(0),
                Err(e) => return self.fail_open(tenant_id, message_type, limits, &e),
            }
        }

        let violation = Window::ALL
            .into_iter()
            .zip(counts)
            .find(|(window, count)| *count >= limits.limit(*window));

        match violation {
            Some((window, count)) => {
                let limit = limits.limit(window);
                RateLimitDecision {
                    allowed: false,
                    limit_type: Some(window),
                    current: count,
                    limit,
                    remaining: 0,
                    reset_time: self.reset_time(tenant_id, message_type, window).await,
                }
            }
            None => {
                let current = counts[0];
                let limit = limits.limit(Window::Minute);
                RateLimitDecision {
                    allowed: true,
                    limit_type: None,
                    current,
                    limit,
                    remaining: limit.saturating_sub(current),
                    reset_time: self.reset_time(tenant_id, message_type, Window::Minute).await,
                }
            }
        }
    }

    /// Current usage across all three windows. Degrades to zero counts when
    /// the store is unreachable.
    pub async fn current_usage(&self, tenant_id: &str, message_type: MessageType) -> UsageReport {
        let limits = self.table.limits(message_type, self.tier_for(tenant_id));

        let mut usage = Vec::with_capacity(3);
        for window in Window::ALL {
            let key = counter_key(tenant_id, message_type, window);
            let current = match self.store.get(&key).await {
                Ok(count) => count.unwrap_or(0),
                Err(e) => {
                    warn!(
                        tenant = %tenant_id,
                        window = %window,
                        error = %e,
                        "counter store unavailable, reporting zero usage"
                    );
                    0
                }
            };
            let reset_in = self.store.ttl_remaining(&key).await.ok().flatten();
            let limit = limits.limit(window);
            usage.push(WindowUsage {
                current,
                limit,
                remaining: limit.saturating_sub(current),
                reset_in,
            });
        }

        let mut usage = usage.into_iter();
        UsageReport {
            minute: usage.next().expect("three windows"),
            hour: usage.next().expect("three windows"),
            day: usage.next().expect("three windows"),
        }
    }

    /// Delete the counters for one window, or all three.
    ///
    /// Administrative operation; store failures propagate rather than fail
    /// open, since nothing is being gated.
    pub async fn reset_limits(
        &self,
        tenant_id: &str,
        message_type: MessageType,
        window: Option<Window>,
    ) -> Result<u64, StoreError> {
        let keys: Vec<String> = match window {
            Some(window) => vec![counter_key(tenant_id, message_type, window)],
            None => Window::ALL
                .into_iter()
                .map(|w| counter_key(tenant_id, message_type, w))
                .collect(),
        };

        let deleted = self.store.delete(&keys).await?;
        debug!(
            tenant = %tenant_id,
            message_type = %message_type,
            deleted,
            "rate limit counters reset"
        );
        Ok(deleted)
    }

    /// Live counter keys for a tenant, for diagnostics.
    pub async fn live_keys(
        &self,
        tenant_id: &str,
        message_type: MessageType,
    ) -> Result<Vec<String>, StoreError> {
        self.store
            .scan_prefix(&counter_prefix(tenant_id, message_type))
            .await
    }

    async fn reset_time(
        &self,
        tenant_id: &str,
        message_type: MessageType,
        window: Window,
    ) -> DateTime<Utc> {
        let key = counter_key(tenant_id, message_type, window);
        let remaining = match self.store.ttl_remaining(&key).await {
            Ok(Some(remaining)) => remaining,
            // Absent key or store trouble: assume a full window.
            Ok(None) | Err(_) => window.duration(),
        };
        Utc::now() + chrono::Duration::from_std(remaining).unwrap_or(chrono::Duration::zero())
    }

    fn fail_open(
        &self,
        tenant_id: &str,
        message_type: MessageType,
        limits: WindowLimits,
        error: &StoreError,
    ) -> RateLimitDecision {
        warn!(
            tenant = %tenant_id,
            message_type = %message_type,
            error = %error,
            "counter store unavailable, failing open"
        );
        RateLimitDecision {
            allowed: true,
            limit_type: None,
            current: 0,
            limit: limits.limit(Window::Minute),
            remaining: 0,
            reset_time: Utc::now()
                + chrono::Duration::from_std(Window::Minute.duration())
                    .unwrap_or(chrono::Duration::zero()),
        }
    }
}
