use std::sync::Arc;

use anyhow::Error;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    models::{
        audit::DeliveryRecord, channel::ChannelOutcome, dispatch::DeliveryContext,
        retry::RetryConfig,
    },
    utils::retry_with_backoff,
};

/// Destination for audit rows.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn write(&self, record: &DeliveryRecord) -> Result<(), Error>;
}

/// Writes one audit row per channel outcome without ever blocking or failing delivery.
#[derive(Clone)]
pub struct DeliveryRecorder {
    sink: Arc<dyn DeliverySink>,
    retry_config: RetryConfig,
}

impl DeliveryRecorder {
    pub fn new(sink: Arc<dyn DeliverySink>, retry_config: RetryConfig) -> Self {
        Self { sink, retry_config }
    }

    /// Spawns the write and returns immediately. Failures are logged, never returned.
    ///
    /// The handle is only for callers that want to wait, such as tests and shutdown.
    pub fn record(&self, outcome: &ChannelOutcome, context: &DeliveryContext) -> JoinHandle<()> {
        let record = DeliveryRecord::from_outcome(outcome, context);
        let sink = Arc::clone(&self.sink);
        let retry_config = self.retry_config.clone();

        tokio::spawn(async move {
            match retry_with_backoff(&retry_config, || sink.write(&record)).await {
                Ok(()) => debug!(
                    event_id = %record.event_id,
                    channel = %record.channel,
                    status = %record.status,
                    sink = sink.name(),
                    "Delivery recorded"
                ),
                Err(e) => warn!(
                    event_id = %record.event_id,
                    recipient_id = %record.recipient_id,
                    channel = %record.channel,
                    sink = sink.name(),
                    error = %e,
                    "Failed to record delivery, audit row dropped"
                ),
            }
        })
    }
}
