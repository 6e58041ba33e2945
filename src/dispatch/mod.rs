//! Outbound/inbound dispatch coordination.
//!
//! ```text
//! send_outbound           receive_inbound
//!      │                        │
//!      ▼                        ▼
//!  ┌─────────┐  deny      ┌───────────┐  duplicate
//!  │ Consent │──────▶ ✗   │ Validate  │──────────▶ ok (idempotent)
//!  └────┬────┘            └─────┬─────┘
//!       ▼                       ▼
//!  ┌─────────┐  deny      ┌───────────┐
//!  │ Limiter │──────▶ ✗   │  Dedup    │
//!  └────┬────┘            └─────┬─────┘
//!       ▼                       ▼
//!  ┌─────────┐            ┌───────────┐
//!  │ Gateway │            │  Contact  │ (best effort)
//!  └────┬────┘            └─────┬─────┘
//!       ▼                       ▼
//!   SENT / FAILED(+retry)   DELIVERED
//! ```

mod coordinator;
mod error;
mod traits;

pub use coordinator::{Dispatcher, InboundOutcome, InboundSms, OutboundRequest};
pub use error::DispatchError;
pub use traits::{
    ConsentDirectory, Contact, ContactDirectory, GatewayError, GatewayReceipt, JobQueue,
    MessageRepository, RetryJob, SmsGateway,
};
