//! Message delivery lifecycle.
//!
//! Pure status-machine logic: every status change on a [`Message`] goes
//! through the transition table, so concurrent or replayed updates are
//! rejected instead of silently overwriting state.
//!
//! ```text
//!   QUEUED ──▶ SENDING ──▶ SENT ──▶ DELIVERED   (terminal)
//!     │  ▲        │          └────▶ UNDELIVERED ─┐
//!     │  │        └────────▶ FAILED ─────────────┤ retry re-enters
//!     │  └───────────────────────────────────────┘
//!     └────▶ CANCELED                            (terminal)
//! ```

mod types;

pub use types::{Direction, InvalidTransition, Message, MessageId, MessageStatus};
