use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    channel::{Channel, ChannelOutcome},
    event::{EventKind, NotificationEvent},
};

/// Everything one dispatch produced, keyed by channel in canonical order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub event_id: Uuid,
    pub event_kind: EventKind,
    pub template_id: String,
    pub outcomes: BTreeMap<Channel, ChannelOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_expires_at: Option<DateTime<Utc>>,
}

impl DispatchResult {
    pub fn empty(event: &NotificationEvent) -> Self {
        Self {
            event_id: event.id,
            event_kind: event.kind,
            template_id: event.template_id().to_string(),
            outcomes: BTreeMap::new(),
            secret_expires_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcome(&self, channel: Channel) -> Option<&ChannelOutcome> {
        self.outcomes.get(&channel)
    }

    pub fn delivered_channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.outcomes
            .values()
            .filter(|outcome| outcome.success)
            .map(|outcome| outcome.channel)
    }

    pub fn any_delivered(&self) -> bool {
        self.outcomes.values().any(|outcome| outcome.success)
    }

    pub fn success_count(&self) -> usize {
        self.delivered_channels().count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }
}

/// Who and what an outcome belongs to, attached to every audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryContext {
    pub event_id: Uuid,
    pub recipient_id: String,
    pub event_kind: EventKind,
    pub template_id: String,
}
