#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use notification_service::{
    clients::{
        adapter::{ChannelAdapter, ChannelAdapters},
        memory::MemorySecretStore,
        template::TemplateRenderer,
    },
    error::ChannelFailure,
    models::{
        audit::DeliveryRecord,
        channel::{Channel, ChannelTarget},
        recipient::Recipient,
        retry::RetryConfig,
        secret::{SecretPurpose, StoredSecret},
        template::RenderedContent,
    },
    services::{
        dispatcher::{DispatchSettings, Dispatcher},
        recorder::{DeliveryRecorder, DeliverySink},
        secret::{SecretIssuer, SecretStore},
    },
};
use serde_json::{Map, Value};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

pub const PUSH_TOKEN: &str = "dGVzdC1kZXZpY2U6APA91bHk3_valid-token.part";

#[derive(Clone)]
pub enum Behavior {
    Deliver,
    Fail(ChannelFailure),
    Delay(Duration),
    Panic,
}

/// Channel adapter that records what it was asked to send.
pub struct FakeAdapter {
    channel: Channel,
    behavior: Behavior,
    calls: AtomicUsize,
    sent: Mutex<Vec<(ChannelTarget, RenderedContent)>>,
}

impl FakeAdapter {
    pub fn new(channel: Channel, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            channel,
            behavior,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn delivering(channel: Channel) -> Arc<Self> {
        Self::new(channel, Behavior::Deliver)
    }

    pub fn failing(channel: Channel, failure: ChannelFailure) -> Arc<Self> {
        Self::new(channel, Behavior::Fail(failure))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<RenderedContent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn targets(&self) -> Vec<ChannelTarget> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }
}

#[async_trait]
impl ChannelAdapter for FakeAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn provider(&self) -> &'static str {
        "fake"
    }

    async fn deliver(
        &self,
        target: &ChannelTarget,
        content: &RenderedContent,
    ) -> Result<Option<String>, ChannelFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), content.clone()));

        match &self.behavior {
            Behavior::Deliver => Ok(Some(format!("{}-msg-{}", self.channel, n))),
            Behavior::Fail(failure) => Err(failure.clone()),
            Behavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Some(format!("{}-late-{}", self.channel, n)))
            }
            Behavior::Panic => panic!("provider client crashed"),
        }
    }
}

/// Audit sink that forwards every record to the test.
pub struct ChannelSink {
    tx: UnboundedSender<DeliveryRecord>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<DeliveryRecord>) {
        let (tx, rx) = unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl DeliverySink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn write(&self, record: &DeliveryRecord) -> Result<(), Error> {
        self.tx
            .send(record.clone())
            .map_err(|_| anyhow!("test receiver dropped"))
    }
}

pub struct FailingSink;

#[async_trait]
impl DeliverySink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn write(&self, _record: &DeliveryRecord) -> Result<(), Error> {
        Err(anyhow!("audit database is down"))
    }
}

pub struct UnreachableStore;

#[async_trait]
impl SecretStore for UnreachableStore {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn put(&self, _secret: &StoredSecret) -> Result<(), Error> {
        Err(anyhow!("token store unreachable"))
    }

    async fn matches(&self, _: &str, _: SecretPurpose, _: &str) -> Result<bool, Error> {
        Err(anyhow!("token store unreachable"))
    }

    async fn remove(&self, _: &str, _: SecretPurpose) -> Result<(), Error> {
        Err(anyhow!("token store unreachable"))
    }

    async fn take_if_matches(&self, _: &str, _: SecretPurpose, _: &str) -> Result<bool, Error> {
        Err(anyhow!("token store unreachable"))
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2,
    }
}

pub fn test_settings() -> DispatchSettings {
    DispatchSettings {
        channel_timeout: Duration::from_millis(300),
        secret_timeout: Duration::from_millis(300),
        ..DispatchSettings::default()
    }
}

/// A dispatcher wired to fakes, plus handles on every fake.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub email: Arc<FakeAdapter>,
    pub sms: Arc<FakeAdapter>,
    pub push: Arc<FakeAdapter>,
    pub store: Arc<MemorySecretStore>,
    pub records: UnboundedReceiver<DeliveryRecord>,
}

impl Harness {
    pub fn new(email: Arc<FakeAdapter>, sms: Arc<FakeAdapter>, push: Arc<FakeAdapter>) -> Self {
        let store = Arc::new(MemorySecretStore::new());
        let (sink, records) = ChannelSink::new();
        let dispatcher = dispatcher_with(
            email.clone(),
            sms.clone(),
            push.clone(),
            store.clone(),
            sink,
            TemplateRenderer::with_builtin().unwrap(),
        );

        Self {
            dispatcher,
            email,
            sms,
            push,
            store,
            records,
        }
    }

    pub fn delivering() -> Self {
        Self::new(
            FakeAdapter::delivering(Channel::Email),
            FakeAdapter::delivering(Channel::Sms),
            FakeAdapter::delivering(Channel::Push),
        )
    }

    pub fn total_calls(&self) -> usize {
        self.email.calls() + self.sms.calls() + self.push.calls()
    }

    /// Waits for `n` audit records, failing the test after a second.
    pub async fn records(&mut self, n: usize) -> Vec<DeliveryRecord> {
        let mut records = Vec::with_capacity(n);
        while records.len() < n {
            let record = tokio::time::timeout(Duration::from_secs(1), self.records.recv())
                .await
                .expect("timed out waiting for audit record")
                .expect("audit channel closed");
            records.push(record);
        }
        records.sort_by_key(|r| r.channel);
        records
    }

    /// Asserts nothing else reaches the audit sink for a short while.
    pub async fn assert_no_more_records(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(100), self.records.recv()).await;
        assert!(next.is_err(), "unexpected audit record: {:?}", next);
    }
}

pub fn dispatcher_with(
    email: Arc<dyn ChannelAdapter>,
    sms: Arc<dyn ChannelAdapter>,
    push: Arc<dyn ChannelAdapter>,
    store: Arc<dyn SecretStore>,
    sink: Arc<dyn DeliverySink>,
    renderer: TemplateRenderer,
) -> Dispatcher {
    Dispatcher::new(
        Arc::new(renderer),
        ChannelAdapters::new(email, sms, push),
        SecretIssuer::new(store),
        DeliveryRecorder::new(sink, fast_retry()),
        test_settings(),
    )
}

pub fn full_recipient() -> Recipient {
    Recipient::new("u-42")
        .with_first_name("Ana")
        .with_email("ana@example.com")
        .with_phone_number("+33612345678")
        .with_push_token(PUSH_TOKEN)
}

pub fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be a JSON object, got {}", other),
    }
}

pub fn text_of(content: &RenderedContent) -> String {
    match content {
        RenderedContent::Email { text, .. } => text.clone(),
        RenderedContent::Sms { body } => body.clone(),
        RenderedContent::Push { body, .. } => body.clone(),
    }
}
