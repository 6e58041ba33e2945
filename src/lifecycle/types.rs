//! Message entity and delivery status machine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ratelimit::MessageType;

/// Unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(u64);

/// Global message ID counter (for recovery).
pub static MESSAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

impl MessageId {
    /// Create a new unique message ID.
    pub fn new() -> Self {
        Self(MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a message ID from a raw value (for recovery).
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Accepted, waiting for dispatch
    Queued,
    /// Handed to the gateway, awaiting its response
    Sending,
    /// Gateway accepted the message
    Sent,
    /// Carrier confirmed delivery
    Delivered,
    /// Gateway rejected or timed out (retryable)
    Failed,
    /// Carrier reported non-delivery (retryable)
    Undelivered,
    /// Canceled before dispatch
    Canceled,
}

impl MessageStatus {
    /// Every status, for totality checks.
    pub const ALL: [MessageStatus; 7] = [
        MessageStatus::Queued,
        MessageStatus::Sending,
        MessageStatus::Sent,
        MessageStatus::Delivered,
        MessageStatus::Failed,
        MessageStatus::Undelivered,
        MessageStatus::Canceled,
    ];

    /// Get the string name of this status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Undelivered => "undelivered",
            Self::Canceled => "canceled",
        }
    }

    /// Allowed destination statuses. Total over every status: terminal
    /// statuses map to the empty slice, and no status contains itself.
    pub fn valid_destinations(&self) -> &'static [MessageStatus] {
        match self {
            Self::Queued => &[MessageStatus::Sending, MessageStatus::Canceled],
            Self::Sending => &[MessageStatus::Sent, MessageStatus::Failed],
            Self::Sent => &[MessageStatus::Delivered, MessageStatus::Undelivered],
            Self::Failed => &[MessageStatus::Queued],
            Self::Undelivered => &[MessageStatus::Queued],
            Self::Delivered => &[],
            Self::Canceled => &[],
        }
    }

    /// Check whether a transition to `to` is allowed.
    pub fn can_transition_to(&self, to: MessageStatus) -> bool {
        self.valid_destinations().contains(&to)
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }

    /// Check if this status represents a retryable failure.
    pub fn is_retryable_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Undelivered)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rejected status transition.
///
/// Raised both for programming errors and for concurrent-modification
/// races where another writer already advanced the message.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid message transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: MessageStatus,
    pub to: MessageStatus,
}

/// A single SMS-style communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Owning tenant
    pub tenant_id: String,
    /// Message direction
    pub direction: Direction,
    /// Billable channel
    pub channel: MessageType,
    /// Message body
    pub content: String,
    /// Sender address
    pub from: String,
    /// Recipient address
    pub to: String,
    /// Current delivery status
    pub status: MessageStatus,
    /// Carrier-assigned id; unique per tenant, the inbound dedup key
    pub external_id: Option<String>,
    /// Completed retry re-entries
    pub retry_count: u32,
    /// Linked contact, when the sender/recipient was matched
    pub contact_id: Option<String>,
    /// Error code from the last failed attempt
    pub error_code: Option<String>,
    /// Error message from the last failed attempt
    pub error_message: Option<String>,
    /// When the message was created
    pub created_at: DateTime<Utc>,
    /// When the message was last updated
    pub updated_at: DateTime<Utc>,
    /// When delivery was confirmed
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a new outbound message in `Queued`.
    pub fn outbound(
        tenant_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            tenant_id: tenant_id.into(),
            direction: Direction::Outbound,
            channel: MessageType::Sms,
            content: content.into(),
            from: from.into(),
            to: to.into(),
            status: MessageStatus::Queued,
            external_id: None,
            retry_count: 0,
            contact_id: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        }
    }

    /// Create an inbound message.
    ///
    /// Inbound messages arrive already delivered; `Delivered` is their
    /// creation state, not a transition.
    pub fn inbound(
        tenant_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            tenant_id: tenant_id.into(),
            direction: Direction::Inbound,
            channel: MessageType::Sms,
            content: content.into(),
            from: from.into(),
            to: to.into(),
            status: MessageStatus::Delivered,
            external_id: Some(external_id.into()),
            retry_count: 0,
            contact_id: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            delivered_at: Some(now),
        }
    }

    /// Set the channel.
    pub fn with_channel(mut self, channel: MessageType) -> Self {
        self.channel = channel;
        self
    }

    /// Set the linked contact.
    pub fn with_contact(mut self, contact_id: impl Into<String>) -> Self {
        self.contact_id = Some(contact_id.into());
        self
    }

    /// Apply a validated status transition.
    ///
    /// Fails when the transition table forbids `status -> to`. On a retry
    /// re-entry (`Failed`/`Undelivered` -> `Queued`) the retry count goes up
    /// by exactly one; `Delivered` stamps the delivery timestamp.
    pub fn transition_to(&mut self, to: MessageStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }

        if to == MessageStatus::Queued && self.status.is_retryable_failure() {
            self.retry_count += 1;
        }
        if to == MessageStatus::Delivered {
            self.delivered_at = Some(Utc::now());
        }

        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition to `Sent`, recording the carrier-assigned id.
    pub fn mark_sent(&mut self, external_id: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition_to(MessageStatus::Sent)?;
        self.external_id = Some(external_id.into());
        self.error_code = None;
        self.error_message = None;
        Ok(())
    }

    /// Transition to `Failed`, recording the error.
    pub fn mark_failed(
        &mut self,
        error_code: Option<String>,
        error_message: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        self.transition_to(MessageStatus::Failed)?;
        self.error_code = error_code;
        self.error_message = Some(error_message.into());
        Ok(())
    }
}
