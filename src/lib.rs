//! Multi-tenant SMS gating and delivery-tracking core.
//!
//! msggate decides whether a message may be sent (rate limits, consent
//! law), advances messages through a validated delivery lifecycle, and
//! keeps carrier webhook processing idempotent. It is transport-agnostic:
//! the embedding service owns the API surface, persistence and queue
//! transport, and plugs them in at the trait seams in [`dispatch`] and
//! [`store`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                           │
//! │   outbound: consent ─▶ rate limit ─▶ gateway ─▶ lifecycle   │
//! │   inbound:  validate ─▶ dedup ─▶ contact ─▶ lifecycle       │
//! └──────┬──────────────┬──────────────────┬───────────────────┘
//!        ▼              ▼                  ▼
//!  ┌──────────┐   ┌───────────┐     ┌───────────┐
//!  │ Consent  │   │  Rate     │     │ Lifecycle │
//!  │ Engine   │   │  Limiter  │     │  (pure)   │
//!  │ (pure)   │   └─────┬─────┘     └───────────┘
//!  └──────────┘         ▼
//!                 ┌──────────────┐
//!                 │ CounterStore │  (shared, atomic, TTL)
//!                 └──────────────┘
//! ```
//!
//! Two policies are load-bearing and deliberate:
//!
//! - The rate limiter **fails open** on store outage: delivery availability
//!   outranks strict enforcement.
//! - A denied attempt is **not rolled back**: every window stays charged,
//!   avoiding multi-key transactions the store does not guarantee.

pub mod config;
pub mod consent;
pub mod dispatch;
pub mod lifecycle;
pub mod phone;
pub mod ratelimit;
pub mod store;
