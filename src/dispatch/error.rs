//! Dispatch error taxonomy.

use chrono::{DateTime, Utc};

use crate::consent::ConsentStatus;
use crate::lifecycle::InvalidTransition;
use crate::ratelimit::Window;

use super::traits::GatewayError;

/// Errors surfaced by the dispatch coordinator.
///
/// Caller mistakes (validation, consent, invalid transition) are fatal to
/// the single request and never retried by the core. Gateway failures
/// become retryable message state where attempts remain. Counter store
/// failures never appear here at all - the rate limiter absorbs them by
/// failing open.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Malformed input; names the offending field.
    #[error("invalid payload: {field} must be a non-empty string")]
    Validation { field: &'static str },

    /// Legal gate failure; the send was blocked before any dispatch work.
    #[error("consent denied for {phone} (status: {status})")]
    ConsentDenied {
        phone: String,
        status: ConsentStatus,
    },

    /// Rate limit hit; carries what the caller needs to retry later.
    #[error("rate limit exceeded for {limit_type} window, resets at {reset_time}")]
    RateLimited {
        limit_type: Window,
        reset_time: DateTime<Utc>,
    },

    /// Status-machine violation; a bug or a concurrent-modification race.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    /// Carrier send failure with no attempts left.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Message persistence failure.
    #[error("message repository error: {0}")]
    Repository(String),
}
