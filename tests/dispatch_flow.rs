//! End-to-end dispatch scenarios against in-memory collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use msggate::config::{DispatchConfig, RateLimitConfig, TenantConfig, TierLimits};
use msggate::consent::{ConsentRecord, ConsentSource, ConsentStatus, ConsentType};
use msggate::dispatch::{
    ConsentDirectory, Contact, ContactDirectory, DispatchError, Dispatcher, GatewayError,
    GatewayReceipt, InboundSms, JobQueue, MessageRepository, OutboundRequest, RetryJob, SmsGateway,
};
use msggate::lifecycle::{Message, MessageId, MessageStatus};
use msggate::ratelimit::{MessageType, RateLimitTable, RateLimiter, Window, WindowLimits};
use msggate::store::MemoryCounterStore;

// =============================================================================
// Fake collaborators
// =============================================================================

#[derive(Default)]
struct InMemoryMessages {
    rows: Mutex<Vec<Message>>,
}

impl InMemoryMessages {
    fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn first(&self) -> Message {
        self.rows.lock().unwrap()[0].clone()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessages {
    async fn find_by_external_id(
        &self,
        tenant_id: &str,
        external_id: &str,
    ) -> anyhow::Result<Option<Message>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_by_id(&self, tenant_id: &str, id: MessageId) -> anyhow::Result<Option<Message>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.id == id)
            .cloned())
    }

    async fn insert(&self, message: &Message) -> anyhow::Result<()> {
        self.rows.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn update(&self, message: &Message) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|m| m.id == message.id) {
            *row = message.clone();
        }
        Ok(())
    }
}

/// Consent directory with a fixed answer, or a simulated outage.
struct FakeConsent {
    record: Option<ConsentRecord>,
    fail: bool,
}

impl FakeConsent {
    fn with_record(record: ConsentRecord) -> Self {
        Self { record: Some(record), fail: false }
    }

    fn empty() -> Self {
        Self { record: None, fail: false }
    }

    fn unavailable() -> Self {
        Self { record: None, fail: true }
    }
}

#[async_trait]
impl ConsentDirectory for FakeConsent {
    async fn find(
        &self,
        _phone: &str,
        _consent_type: ConsentType,
    ) -> anyhow::Result<Option<ConsentRecord>> {
        if self.fail {
            anyhow::bail!("consent database unreachable");
        }
        Ok(self.record.clone())
    }
}

enum GatewayMode {
    Succeed,
    Reject,
    /// Respond successfully, but only after this long.
    Delay(Duration),
}

struct FakeGateway {
    mode: GatewayMode,
    calls: AtomicU64,
    sequence: AtomicU64,
}

impl FakeGateway {
    fn new(mode: GatewayMode) -> Self {
        Self {
            mode,
            calls: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SmsGateway for FakeGateway {
    async fn send(
        &self,
        _from: &str,
        _to: &str,
        _body: &str,
    ) -> Result<GatewayReceipt, GatewayError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.mode {
            GatewayMode::Succeed => {}
            GatewayMode::Reject => {
                return Err(GatewayError::Rejected {
                    code: "30007".to_string(),
                    message: "carrier filtered".to_string(),
                })
            }
            GatewayMode::Delay(delay) => tokio::time::sleep(*delay).await,
        }
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        Ok(GatewayReceipt {
            external_id: format!("SM{n:04}"),
        })
    }
}

struct FakeContacts {
    contact: Option<Contact>,
    fail: bool,
}

impl FakeContacts {
    fn none() -> Self {
        Self { contact: None, fail: false }
    }

    fn matching(id: &str, phone: &str) -> Self {
        Self {
            contact: Some(Contact {
                id: id.to_string(),
                phone: phone.to_string(),
                display_name: None,
            }),
            fail: false,
        }
    }

    fn unavailable() -> Self {
        Self { contact: None, fail: true }
    }
}

#[async_trait]
impl ContactDirectory for FakeContacts {
    async fn find_by_phone(&self, phone: &str) -> anyhow::Result<Option<Contact>> {
        if self.fail {
            anyhow::bail!("contact service unreachable");
        }
        Ok(self
            .contact
            .clone()
            .filter(|c| c.phone == phone))
    }
}

#[derive(Default)]
struct RecordingQueue {
    jobs: Mutex<Vec<RetryJob>>,
}

impl RecordingQueue {
    fn jobs(&self) -> Vec<RetryJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: RetryJob) -> anyhow::Result<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    dispatcher: Dispatcher,
    messages: Arc<InMemoryMessages>,
    gateway: Arc<FakeGateway>,
    queue: Arc<RecordingQueue>,
    limiter: Arc<RateLimiter>,
}

struct HarnessBuilder {
    consent: FakeConsent,
    contacts: FakeContacts,
    gateway_mode: GatewayMode,
    config: DispatchConfig,
    tenants: HashMap<String, TenantConfig>,
    minute_limit: u64,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            consent: FakeConsent::empty(),
            contacts: FakeContacts::none(),
            gateway_mode: GatewayMode::Succeed,
            config: DispatchConfig::default(),
            tenants: HashMap::new(),
            minute_limit: 100,
        }
    }

    fn consent(mut self, consent: FakeConsent) -> Self {
        self.consent = consent;
        self
    }

    fn contacts(mut self, contacts: FakeContacts) -> Self {
        self.contacts = contacts;
        self
    }

    fn gateway(mut self, mode: GatewayMode) -> Self {
        self.gateway_mode = mode;
        self
    }

    fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    fn tenant(mut self, id: &str, config: TenantConfig) -> Self {
        self.tenants.insert(id.to_string(), config);
        self
    }

    fn minute_limit(mut self, limit: u64) -> Self {
        self.minute_limit = limit;
        self
    }

    fn build(self) -> Harness {
        let limits = WindowLimits {
            minute: self.minute_limit,
            hour: 10_000,
            day: 100_000,
        };
        let table = RateLimitTable::from_config(&RateLimitConfig {
            sms: TierLimits { free: limits, paid: limits },
            mms: TierLimits { free: limits, paid: limits },
        });

        let messages = Arc::new(InMemoryMessages::default());
        let gateway = Arc::new(FakeGateway::new(self.gateway_mode));
        let queue = Arc::new(RecordingQueue::default());
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            table,
        ));

        let dispatcher = Dispatcher::new(
            limiter.clone(),
            messages.clone(),
            gateway.clone(),
            Arc::new(self.consent),
            Arc::new(self.contacts),
            queue.clone(),
        )
        .with_config(self.config)
        .with_tenants(self.tenants);

        Harness {
            dispatcher,
            messages,
            gateway,
            queue,
            limiter,
        }
    }
}

fn opted_in_marketing(phone: &str) -> ConsentRecord {
    let mut record = ConsentRecord::new(phone, ConsentType::Marketing, ConsentSource::WebForm);
    record
        .apply_transition(ConsentStatus::OptedIn, ConsentSource::WebForm, None)
        .unwrap();
    record
}

fn opted_out_marketing(phone: &str) -> ConsentRecord {
    let mut record = opted_in_marketing(phone);
    record
        .apply_transition(ConsentStatus::OptedOut, ConsentSource::Sms, None)
        .unwrap();
    record
}

fn outbound(tenant: &str) -> OutboundRequest {
    OutboundRequest::new(tenant, "+14155550100", "+14155552671", "hello")
}

fn inbound(external_id: &str) -> InboundSms {
    InboundSms {
        external_id: external_id.to_string(),
        from: "+1 (415) 555-2671".to_string(),
        to: "+14155550100".to_string(),
        body: "STOP".to_string(),
        tenant_id: "t1".to_string(),
    }
}

// =============================================================================
// Outbound
// =============================================================================

#[tokio::test]
async fn outbound_transactional_send_succeeds() {
    let h = HarnessBuilder::new().build();

    let message = h.dispatcher.send_outbound(outbound("t1")).await.unwrap();

    assert_eq!(message.status, MessageStatus::Sent);
    assert!(message.external_id.is_some());
    assert_eq!(h.gateway.calls(), 1);
    assert_eq!(h.messages.len(), 1);
    assert_eq!(h.messages.first().status, MessageStatus::Sent);
}

#[tokio::test]
async fn outbound_marketing_requires_consent_record() {
    let h = HarnessBuilder::new().consent(FakeConsent::empty()).build();

    let err = h
        .dispatcher
        .send_outbound(outbound("t1").with_consent_type(ConsentType::Marketing))
        .await
        .unwrap_err();

    match err {
        DispatchError::ConsentDenied { status, .. } => {
            assert_eq!(status, ConsentStatus::Unknown);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.gateway.calls(), 0);
}

#[tokio::test]
async fn outbound_opted_out_blocks_before_rate_limiter() {
    let h = HarnessBuilder::new()
        .consent(FakeConsent::with_record(opted_out_marketing("+14155552671")))
        .build();

    let err = h
        .dispatcher
        .send_outbound(outbound("t1").with_consent_type(ConsentType::Marketing))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::ConsentDenied { .. }));
    assert_eq!(h.gateway.calls(), 0);
    // The rate limiter was never consulted: nothing was charged.
    let usage = h.limiter.current_usage("t1", MessageType::Sms).await;
    assert_eq!(usage.minute.current, 0);
}

#[tokio::test]
async fn outbound_consent_outage_degrades_open() {
    let h = HarnessBuilder::new()
        .consent(FakeConsent::unavailable())
        .build();

    let message = h
        .dispatcher
        .send_outbound(outbound("t1").with_consent_type(ConsentType::Marketing))
        .await
        .unwrap();

    // Lookup failure is not a legal denial: the send went through the
    // rate limiter and the gateway.
    assert_eq!(message.status, MessageStatus::Sent);
    assert_eq!(h.gateway.calls(), 1);
    let usage = h.limiter.current_usage("t1", MessageType::Sms).await;
    assert_eq!(usage.minute.current, 1);
}

#[tokio::test]
async fn outbound_opted_in_marketing_send_succeeds() {
    let h = HarnessBuilder::new()
        .consent(FakeConsent::with_record(opted_in_marketing("+14155552671")))
        .build();

    let message = h
        .dispatcher
        .send_outbound(outbound("t1").with_consent_type(ConsentType::Marketing))
        .await
        .unwrap();
    assert_eq!(message.status, MessageStatus::Sent);
}

#[tokio::test]
async fn outbound_transactional_gated_when_tenant_requires_it() {
    let h = HarnessBuilder::new()
        .consent(FakeConsent::empty())
        .tenant(
            "t1",
            TenantConfig {
                require_transactional_consent: true,
                ..TenantConfig::default()
            },
        )
        .build();

    let err = h.dispatcher.send_outbound(outbound("t1")).await.unwrap_err();
    assert!(matches!(err, DispatchError::ConsentDenied { .. }));
}

#[tokio::test]
async fn outbound_rate_limit_denies_with_reset_time() {
    let h = HarnessBuilder::new().minute_limit(2).build();

    h.dispatcher.send_outbound(outbound("t1")).await.unwrap();
    h.dispatcher.send_outbound(outbound("t1")).await.unwrap();

    let err = h.dispatcher.send_outbound(outbound("t1")).await.unwrap_err();
    match err {
        DispatchError::RateLimited {
            limit_type,
            reset_time,
        } => {
            assert_eq!(limit_type, Window::Minute);
            assert!(reset_time > chrono::Utc::now());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.gateway.calls(), 2);
}

#[tokio::test]
async fn outbound_gateway_failure_enqueues_retry() {
    let h = HarnessBuilder::new().gateway(GatewayMode::Reject).build();

    let message = h.dispatcher.send_outbound(outbound("t1")).await.unwrap();

    assert_eq!(message.status, MessageStatus::Failed);
    assert_eq!(message.error_code.as_deref(), Some("30007"));

    let jobs = h.queue.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].message_id, message.id);
    assert_eq!(jobs[0].attempt, 2);
}

#[tokio::test]
async fn outbound_failure_surfaced_when_attempts_exhausted() {
    let h = HarnessBuilder::new()
        .gateway(GatewayMode::Reject)
        .config(DispatchConfig {
            max_attempts: 1,
            ..DispatchConfig::default()
        })
        .build();

    let err = h.dispatcher.send_outbound(outbound("t1")).await.unwrap_err();

    assert!(matches!(err, DispatchError::Gateway(GatewayError::Rejected { .. })));
    assert!(h.queue.jobs().is_empty());
    // The failure is still recorded on the message.
    assert_eq!(h.messages.first().status, MessageStatus::Failed);
}

#[tokio::test]
async fn outbound_gateway_timeout_is_retryable_failure() {
    let h = HarnessBuilder::new()
        .gateway(GatewayMode::Delay(Duration::from_millis(200)))
        .config(DispatchConfig {
            gateway_timeout: Duration::from_millis(20),
            ..DispatchConfig::default()
        })
        .build();

    let message = h.dispatcher.send_outbound(outbound("t1")).await.unwrap();

    assert_eq!(message.status, MessageStatus::Failed);
    assert!(message.error_message.unwrap().contains("timeout"));
    assert_eq!(h.queue.jobs().len(), 1);
}

#[tokio::test]
async fn outbound_rejects_empty_fields() {
    let h = HarnessBuilder::new().build();

    let mut request = outbound("t1");
    request.content = String::new();

    let err = h.dispatcher.send_outbound(request).await.unwrap_err();
    match err {
        DispatchError::Validation { field } => assert_eq!(field, "content"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.messages.len(), 0);
}

#[tokio::test]
async fn retry_redelivers_and_counts_the_attempt() {
    let h = HarnessBuilder::new().gateway(GatewayMode::Reject).build();

    let failed = h.dispatcher.send_outbound(outbound("t1")).await.unwrap();
    assert_eq!(failed.retry_count, 0);

    // The queue consumer hands the failed message back for another pass.
    let retried = h.dispatcher.retry_outbound(failed).await.unwrap();
    assert_eq!(retried.status, MessageStatus::Failed);
    assert_eq!(retried.retry_count, 1);
    assert_eq!(h.gateway.calls(), 2);

    // Each failed pass enqueued a follow-up while attempts remained.
    let jobs = h.queue.jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].attempt, 3);
}

// =============================================================================
// Inbound
// =============================================================================

#[tokio::test]
async fn inbound_webhook_persists_delivered_message() {
    let h = HarnessBuilder::new().build();

    let outcome = h.dispatcher.receive_inbound(inbound("SM1")).await.unwrap();

    assert!(!outcome.is_duplicate());
    let message = outcome.message();
    assert_eq!(message.status, MessageStatus::Delivered);
    assert_eq!(message.external_id.as_deref(), Some("SM1"));
    assert!(message.delivered_at.is_some());
    assert_eq!(h.messages.len(), 1);
}

#[tokio::test]
async fn inbound_duplicate_webhook_is_idempotent() {
    let h = HarnessBuilder::new().build();

    let first = h.dispatcher.receive_inbound(inbound("SM1")).await.unwrap();
    let second = h.dispatcher.receive_inbound(inbound("SM1")).await.unwrap();

    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    assert_eq!(first.message().id, second.message().id);
    // Exactly one persisted record.
    assert_eq!(h.messages.len(), 1);
}

#[tokio::test]
async fn inbound_links_contact_by_normalized_phone() {
    let h = HarnessBuilder::new()
        .contacts(FakeContacts::matching("contact_7", "+14155552671"))
        .build();

    // The raw sender is formatted; matching happens on the normalized form.
    let outcome = h.dispatcher.receive_inbound(inbound("SM1")).await.unwrap();
    assert_eq!(outcome.message().contact_id.as_deref(), Some("contact_7"));
}

#[tokio::test]
async fn inbound_contact_outage_does_not_block_processing() {
    let h = HarnessBuilder::new()
        .contacts(FakeContacts::unavailable())
        .build();

    let outcome = h.dispatcher.receive_inbound(inbound("SM1")).await.unwrap();
    assert_eq!(outcome.message().contact_id, None);
    assert_eq!(h.messages.len(), 1);
}

#[tokio::test]
async fn inbound_unnormalizable_sender_still_accepted() {
    let h = HarnessBuilder::new()
        .contacts(FakeContacts::matching("contact_7", "+14155552671"))
        .build();

    let mut payload = inbound("SM1");
    payload.from = "SHORTCODE".to_string();

    let outcome = h.dispatcher.receive_inbound(payload).await.unwrap();
    assert_eq!(outcome.message().contact_id, None);
    assert_eq!(outcome.message().from, "SHORTCODE");
}

#[tokio::test]
async fn inbound_validation_precedes_side_effects() {
    let h = HarnessBuilder::new().build();

    let mut payload = inbound("SM1");
    payload.tenant_id = String::new();

    let err = h.dispatcher.receive_inbound(payload).await.unwrap_err();
    match err {
        DispatchError::Validation { field } => assert_eq!(field, "tenant_id"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.messages.len(), 0);
}
