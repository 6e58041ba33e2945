//! Counter storage for rate limiting.
//!
//! Rate limit counters live in an external atomic key-value store shared by
//! every node. The [`CounterStore`] trait captures the contract the limiter
//! relies on:
//!
//! - **Atomic increments**: concurrent callers each observe a distinct,
//!   strictly increasing count for the same key. No lost updates.
//! - **TTL expiry**: a counter past its expiry is absent (count 0), even if
//!   the backend has not physically removed it yet. Window freshness is
//!   enforced by TTLs, never by a polling sweep.
//! - **Compound write**: [`CounterStore::increment_with_expiry`] performs the
//!   increment and the initial TTL in one atomic step, so a crash between
//!   the two calls can never leave a counter that never resets.
//!
//! # Implementations
//!
//! - [`MemoryCounterStore`]: in-process, volatile - for development/testing
//! - [`UnavailableCounterStore`]: fails every call - for outage testing

mod memory;
mod mock;

pub use memory::MemoryCounterStore;
pub use mock::UnavailableCounterStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Errors raised by a counter store backend.
///
/// All operations are fallible: the store is a remote shared resource and
/// may be unreachable at any time. The rate limiter converts these into
/// fail-open decisions; they never propagate to dispatch callers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store backend error: {0}")]
    Backend(String),

    #[error("timeout waiting for counter store")]
    Timeout,
}

/// Atomic counter store with TTL expiry.
///
/// All operations may fail with [`StoreError`]. Implementations must be
/// thread-safe; mutual exclusion is delegated entirely to the store's own
/// atomicity guarantees, no in-process locking is layered on top.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment a counter, initializing an absent key to 1.
    ///
    /// A freshly initialized key has no expiry until one is set. The rate
    /// limiter's write path must use [`Self::increment_with_expiry`]
    /// instead; the split form exists for backends and tooling.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Set or refresh the TTL on a key. Idempotent; no-op for absent keys.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomic compound of increment + initial expiry.
    ///
    /// The TTL is applied only when the increment created the key, so a
    /// window expires a fixed interval after its first hit rather than
    /// sliding forward on every call.
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Read a counter. Returns `None` for absent or expired keys.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Remaining TTL for a key. Returns `None` for absent keys or keys
    /// without an expiry.
    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Delete keys. Returns the number of keys actually removed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// List live keys beginning with a prefix.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Shared counter store handle.
pub type SharedCounterStore = Arc<dyn CounterStore>;
