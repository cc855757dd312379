use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{channel::Channel, secret::SecretPurpose};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AccountVerification,
    PasswordReset,
    SubscriptionStarted,
    SubscriptionEnded,
    Invoice,
    PaymentFailed,
    AiResult,
    Custom,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AccountVerification => "account_verification",
            EventKind::PasswordReset => "password_reset",
            EventKind::SubscriptionStarted => "subscription_started",
            EventKind::SubscriptionEnded => "subscription_ended",
            EventKind::Invoice => "invoice",
            EventKind::PaymentFailed => "payment_failed",
            EventKind::AiResult => "ai_result",
            EventKind::Custom => "custom",
        }
    }

    /// Built-in template backing this kind. Custom events name their own.
    pub fn default_template_id(&self) -> &'static str {
        self.as_str()
    }

    /// Secret that must exist before a message of this kind can be rendered.
    pub fn secret_purpose(&self) -> Option<SecretPurpose> {
        match self {
            EventKind::AccountVerification => Some(SecretPurpose::AccountVerification),
            EventKind::PasswordReset => Some(SecretPurpose::PasswordReset),
            _ => None,
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(self.as_str())
    }
}

/// Channels an event kind is allowed to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelPolicy(BTreeSet<Channel>);

impl ChannelPolicy {
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self(channels.into_iter().collect())
    }

    pub fn all() -> Self {
        Self::new(Channel::ALL)
    }

    pub fn default_for(kind: EventKind) -> Self {
        match kind {
            EventKind::AccountVerification
            | EventKind::PasswordReset
            | EventKind::SubscriptionStarted
            | EventKind::SubscriptionEnded => Self::all(),
            EventKind::Invoice | EventKind::PaymentFailed | EventKind::Custom => {
                Self::new([Channel::Email])
            }
            EventKind::AiResult => Self::new([Channel::Push]),
        }
    }

    pub fn allows(&self, channel: Channel) -> bool {
        self.0.contains(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One inbound notification request. Built per request, consumed by a single dispatch.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub payload: Map<String, Value>,
    pub policy: ChannelPolicy,
    template_id: Option<String>,
}

impl NotificationEvent {
    pub fn new(kind: EventKind, payload: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            policy: ChannelPolicy::default_for(kind),
            template_id: None,
        }
    }

    pub fn custom(
        template_id: impl Into<String>,
        policy: ChannelPolicy,
        payload: Map<String, Value>,
    ) -> Self {
        Self::new(EventKind::Custom, payload)
            .with_template(template_id)
            .with_policy(policy)
    }

    pub fn with_policy(mut self, policy: ChannelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    pub fn template_id(&self) -> &str {
        self.template_id
            .as_deref()
            .unwrap_or_else(|| self.kind.default_template_id())
    }
}
