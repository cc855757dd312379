//! Error taxonomy of the dispatch engine.
//!
//! Only [`DispatchError`] ever reaches the caller of a dispatch. Channel and template
//! failures are folded into the per-channel outcome, and audit failures are logged and dropped.

use std::time::Duration;

use thiserror::Error;

use crate::models::channel::{Channel, ChannelErrorCode};

/// Fatal to a whole dispatch; raised before any channel is attempted.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("secret issuance failed: {0}")]
    SecretIssuance(#[from] SecretError),

    #[error("secret issuance timed out after {0:?}")]
    SecretIssuanceTimeout(Duration),
}

/// Provider failure normalized by a channel adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelFailure {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("unknown provider failure: {0}")]
    Unknown(String),
}

impl ChannelFailure {
    pub fn code(&self) -> ChannelErrorCode {
        match self {
            ChannelFailure::ProviderUnavailable(_) => ChannelErrorCode::ProviderUnavailable,
            ChannelFailure::InvalidTarget(_) => ChannelErrorCode::InvalidTarget,
            ChannelFailure::RateLimited(_) => ChannelErrorCode::RateLimited,
            ChannelFailure::Unknown(_) => ChannelErrorCode::Unknown,
        }
    }
}

impl From<reqwest::Error> for ChannelFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ChannelFailure::ProviderUnavailable(err.to_string())
        } else {
            ChannelFailure::Unknown(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("no {channel} template registered for '{template_id}'")]
    NotFound {
        template_id: String,
        channel: Channel,
    },

    #[error("failed to render {channel} template '{template_id}': {reason}")]
    Render {
        template_id: String,
        channel: Channel,
        reason: String,
    },
}

impl TemplateError {
    pub fn code(&self) -> ChannelErrorCode {
        match self {
            TemplateError::NotFound { .. } => ChannelErrorCode::TemplateNotFound,
            TemplateError::Render { .. } => ChannelErrorCode::RenderError,
        }
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("token store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("secure random source failed: {0}")]
    Entropy(String),

    #[error("secret lifetime must be positive")]
    InvalidTtl,
}

#[derive(Debug, Error)]
pub enum ProfileStoreError {
    #[error("resource not found in profile store")]
    NotFound,

    #[error("profile store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("profile store returned {status}: {body}")]
    Status { status: u16, body: String },
}
