//! External collaborator seams.
//!
//! The coordinator composes the core against services it does not own:
//! the CRM contact directory, the consent record store, the carrier
//! gateway, the async job queue and message persistence. Each is a fixed
//! capability interface; the embedding service supplies the
//! implementation for whatever technology it runs on.

use async_trait::async_trait;

use crate::consent::{ConsentRecord, ConsentType};
use crate::lifecycle::{Message, MessageId};

/// A CRM contact matched by phone number.
#[derive(Debug, Clone)]
pub struct Contact {
    pub id: String,
    pub phone: String,
    pub display_name: Option<String>,
}

/// Successful gateway hand-off.
#[derive(Debug, Clone)]
pub struct GatewayReceipt {
    /// Carrier-assigned message id
    pub external_id: String,
}

/// Carrier gateway failure.
///
/// Classified retryable vs non-retryable downstream via the resulting
/// message status; a timeout is an ordinary failure, never an
/// unknown/ambiguous state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("timeout waiting for gateway response")]
    Timeout,

    #[error("gateway rejected message ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Carrier error code, when one was returned.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// A queued delivery retry.
#[derive(Debug, Clone)]
pub struct RetryJob {
    /// Job name for the queue consumer
    pub name: String,
    /// Message to retry
    pub message_id: MessageId,
    /// Owning tenant
    pub tenant_id: String,
    /// Attempt number the job will perform (1-based)
    pub attempt: u32,
    /// Queue priority
    pub priority: u8,
    /// Attempt ceiling, echoed for the consumer
    pub max_attempts: u32,
}

/// Consent record lookup.
#[async_trait]
pub trait ConsentDirectory: Send + Sync {
    /// Find the consent record for a (phone, consent type), if any.
    async fn find(
        &self,
        phone: &str,
        consent_type: ConsentType,
    ) -> anyhow::Result<Option<ConsentRecord>>;
}

/// CRM contact lookup by normalized phone number.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> anyhow::Result<Option<Contact>>;
}

/// Carrier SMS gateway.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, from: &str, to: &str, body: &str)
        -> Result<GatewayReceipt, GatewayError>;
}

/// Async job submission for delivery retries.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: RetryJob) -> anyhow::Result<()>;
}

/// Message persistence owned by the embedding service.
///
/// At most one writer performs a given transition at a time per record;
/// that is the caller's concurrency control (e.g. optimistic version
/// checks), not this core's.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Look up a message by its carrier-assigned id within a tenant.
    async fn find_by_external_id(
        &self,
        tenant_id: &str,
        external_id: &str,
    ) -> anyhow::Result<Option<Message>>;

    /// Look up a message by id within a tenant.
    async fn find_by_id(&self, tenant_id: &str, id: MessageId) -> anyhow::Result<Option<Message>>;

    /// Persist a new message.
    async fn insert(&self, message: &Message) -> anyhow::Result<()>;

    /// Persist an updated message.
    async fn update(&self, message: &Message) -> anyhow::Result<()>;
}
