use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    channel::{Channel, ChannelErrorCode, ChannelOutcome},
    dispatch::DeliveryContext,
    event::EventKind,
    status::DeliveryStatus,
};

/// One audit row: a single channel attempt of a single event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub event_id: Uuid,
    pub recipient_id: String,
    pub event_kind: EventKind,
    pub template_id: String,
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub provider_message_id: Option<String>,
    pub error_code: Option<ChannelErrorCode>,
    pub error_message: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn new(context: &DeliveryContext, channel: Channel, status: DeliveryStatus) -> Self {
        Self {
            event_id: context.event_id,
            recipient_id: context.recipient_id.clone(),
            event_kind: context.event_kind,
            template_id: context.template_id.clone(),
            channel,
            status,
            provider_message_id: None,
            error_code: None,
            error_message: None,
            attempted_at: Utc::now(),
        }
    }

    pub fn from_outcome(outcome: &ChannelOutcome, context: &DeliveryContext) -> Self {
        let mut record = Self::new(
            context,
            outcome.channel,
            DeliveryStatus::from_success(outcome.success),
        )
        .attempted_at(outcome.timestamp);

        if let Some(message_id) = &outcome.message_id {
            record = record.with_message_id(message_id.clone());
        }
        if let Some(code) = outcome.error_code {
            record = record.with_error(code, outcome.error_message.clone().unwrap_or_default());
        }
        record
    }

    pub fn with_message_id(mut self, message_id: String) -> Self {
        self.provider_message_id = Some(message_id);
        self
    }

    pub fn with_error(mut self, code: ChannelErrorCode, message: String) -> Self {
        self.error_code = Some(code);
        self.error_message = Some(message);
        self
    }

    pub fn attempted_at(mut self, at: DateTime<Utc>) -> Self {
        self.attempted_at = at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> DeliveryContext {
        DeliveryContext {
            event_id: Uuid::new_v4(),
            recipient_id: "u-9".to_string(),
            event_kind: EventKind::PaymentFailed,
            template_id: "payment_failed".to_string(),
        }
    }

    #[test]
    fn failed_outcome_becomes_failed_row() {
        let outcome =
            ChannelOutcome::failed(Channel::Email, ChannelErrorCode::RateLimited, "429 from provider");
        let record = DeliveryRecord::from_outcome(&outcome, &context());

        assert_eq!(record.status, DeliveryStatus::Failed);
        assert_eq!(record.error_code, Some(ChannelErrorCode::RateLimited));
        assert_eq!(record.error_message.as_deref(), Some("429 from provider"));
        assert_eq!(record.attempted_at, outcome.timestamp);
    }

    #[test]
    fn delivered_outcome_keeps_provider_id() {
        let outcome = ChannelOutcome::delivered(Channel::Sms, Some("SM123".to_string()));
        let record = DeliveryRecord::from_outcome(&outcome, &context());

        assert_eq!(record.status, DeliveryStatus::Sent);
        assert_eq!(record.provider_message_id.as_deref(), Some("SM123"));
        assert!(record.error_code.is_none());
    }
}
