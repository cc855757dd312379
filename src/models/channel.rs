use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery medium. Declaration order is the canonical attempt/report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Push];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(self.as_str())
    }
}

/// Address a single channel attempt is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelTarget {
    Email(String),
    Sms(String),
    Push(String),
}

impl ChannelTarget {
    pub fn channel(&self) -> Channel {
        match self {
            ChannelTarget::Email(_) => Channel::Email,
            ChannelTarget::Sms(_) => Channel::Sms,
            ChannelTarget::Push(_) => Channel::Push,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            ChannelTarget::Email(address)
            | ChannelTarget::Sms(address)
            | ChannelTarget::Push(address) => address,
        }
    }
}

/// Normalized failure code carried by a failed [`ChannelOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelErrorCode {
    ProviderUnavailable,
    InvalidTarget,
    RateLimited,
    Unknown,
    TemplateNotFound,
    RenderError,
}

impl ChannelErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelErrorCode::ProviderUnavailable => "provider_unavailable",
            ChannelErrorCode::InvalidTarget => "invalid_target",
            ChannelErrorCode::RateLimited => "rate_limited",
            ChannelErrorCode::Unknown => "unknown",
            ChannelErrorCode::TemplateNotFound => "template_not_found",
            ChannelErrorCode::RenderError => "render_error",
        }
    }
}

impl Display for ChannelErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(self.as_str())
    }
}

/// Result of one delivery attempt on one channel. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ChannelErrorCode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl ChannelOutcome {
    pub fn delivered(channel: Channel, message_id: Option<String>) -> Self {
        Self {
            channel,
            success: true,
            message_id,
            error_code: None,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(channel: Channel, code: ChannelErrorCode, message: impl Into<String>) -> Self {
        Self {
            channel,
            success: false,
            message_id: None,
            error_code: Some(code),
            error_message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_invalid_target(&self) -> bool {
        self.error_code == Some(ChannelErrorCode::InvalidTarget)
    }
}
