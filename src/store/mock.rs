//! Failing counter store for outage testing.

use std::time::Duration;

use async_trait::async_trait;

use super::{CounterStore, StoreError};

/// A counter store that fails every operation.
///
/// Used to exercise the rate limiter's fail-open path without standing up
/// a real backend and cutting its network.
#[derive(Debug, Default)]
pub struct UnavailableCounterStore;

impl UnavailableCounterStore {
    pub fn new() -> Self {
        Self
    }

    fn outage<T>(&self) -> Result<T, StoreError> {
        Err(StoreError::Unavailable("injected outage".to_string()))
    }
}

#[async_trait]
impl CounterStore for UnavailableCounterStore {
    async fn increment(&self, _key: &str) -> Result<u64, StoreError> {
        self.outage()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
        self.outage()
    }

    async fn increment_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<u64, StoreError> {
        self.outage()
    }

    async fn get(&self, _key: &str) -> Result<Option<u64>, StoreError> {
        self.outage()
    }

    async fn ttl_remaining(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        self.outage()
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, StoreError> {
        self.outage()
    }

    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        self.outage()
    }
}
