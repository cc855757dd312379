use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    clients::{
        fcm::{FcmPushAdapter, GcpTokenSource},
        mailgun::MailgunEmailAdapter,
        smtp::SmtpEmailAdapter,
        twilio::TwilioSmsAdapter,
    },
    config::{Config, EmailProviderKind},
    error::ChannelFailure,
    models::{
        channel::{Channel, ChannelErrorCode, ChannelOutcome, ChannelTarget},
        template::RenderedContent,
    },
};

/// Uniform capability over one delivery provider.
///
/// Implementations hold only read-only provider handles, so a single instance is shared
/// by every concurrent dispatch. One `send` is exactly one provider call.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> Channel;

    fn provider(&self) -> &'static str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Performs the provider call. `Ok` carries the provider message id when there is one.
    async fn deliver(
        &self,
        target: &ChannelTarget,
        content: &RenderedContent,
    ) -> Result<Option<String>, ChannelFailure>;

    async fn send(&self, target: &ChannelTarget, content: &RenderedContent) -> ChannelOutcome {
        let channel = self.channel();

        if target.channel() != channel || content.channel() != channel {
            return ChannelOutcome::failed(
                channel,
                ChannelErrorCode::Unknown,
                format!(
                    "{} adapter received {} target with {} content",
                    channel,
                    target.channel(),
                    content.channel()
                ),
            );
        }

        match self.deliver(target, content).await {
            Ok(message_id) => {
                debug!(
                    channel = %channel,
                    provider = self.provider(),
                    message_id = ?message_id,
                    "Channel delivery accepted"
                );
                ChannelOutcome::delivered(channel, message_id)
            }
            Err(failure) => {
                warn!(
                    channel = %channel,
                    provider = self.provider(),
                    code = %failure.code(),
                    error = %failure,
                    "Channel delivery failed"
                );
                ChannelOutcome::failed(channel, failure.code(), failure.to_string())
            }
        }
    }
}

/// Stand-in for a channel whose provider credentials are missing.
///
/// Every send deterministically fails with `ProviderUnavailable` without any I/O.
pub struct DisabledAdapter {
    channel: Channel,
    reason: String,
}

impl DisabledAdapter {
    pub fn new(channel: Channel, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(channel = %channel, reason = %reason, "Channel disabled");
        Self { channel, reason }
    }
}

#[async_trait]
impl ChannelAdapter for DisabledAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn provider(&self) -> &'static str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn deliver(
        &self,
        _target: &ChannelTarget,
        _content: &RenderedContent,
    ) -> Result<Option<String>, ChannelFailure> {
        Err(ChannelFailure::ProviderUnavailable(format!(
            "{} channel is disabled: {}",
            self.channel, self.reason
        )))
    }
}

/// One adapter per channel, injected into the dispatcher.
#[derive(Clone)]
pub struct ChannelAdapters {
    email: Arc<dyn ChannelAdapter>,
    sms: Arc<dyn ChannelAdapter>,
    push: Arc<dyn ChannelAdapter>,
}

impl ChannelAdapters {
    pub fn new(
        email: Arc<dyn ChannelAdapter>,
        sms: Arc<dyn ChannelAdapter>,
        push: Arc<dyn ChannelAdapter>,
    ) -> Self {
        Self { email, sms, push }
    }

    pub fn disabled(reason: &str) -> Self {
        Self::new(
            Arc::new(DisabledAdapter::new(Channel::Email, reason)),
            Arc::new(DisabledAdapter::new(Channel::Sms, reason)),
            Arc::new(DisabledAdapter::new(Channel::Push, reason)),
        )
    }

    pub fn get(&self, channel: Channel) -> Arc<dyn ChannelAdapter> {
        match channel {
            Channel::Email => Arc::clone(&self.email),
            Channel::Sms => Arc::clone(&self.sms),
            Channel::Push => Arc::clone(&self.push),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &Arc<dyn ChannelAdapter>)> {
        [
            (Channel::Email, &self.email),
            (Channel::Sms, &self.sms),
            (Channel::Push, &self.push),
        ]
        .into_iter()
    }

    /// Builds the provider adapters the configuration has credentials for.
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let email: Arc<dyn ChannelAdapter> = match config.email_provider {
            EmailProviderKind::Mailgun => match (&config.mailgun_api_key, &config.mailgun_domain) {
                (Some(_), Some(_)) => Arc::new(MailgunEmailAdapter::from_config(config)?),
                _ => Arc::new(DisabledAdapter::new(
                    Channel::Email,
                    "MAILGUN_API_KEY and MAILGUN_DOMAIN are required",
                )),
            },
            EmailProviderKind::Smtp => match &config.smtp_host {
                Some(_) => Arc::new(SmtpEmailAdapter::from_config(config)?),
                None => Arc::new(DisabledAdapter::new(Channel::Email, "SMTP_HOST is not set")),
            },
            EmailProviderKind::Disabled => Arc::new(DisabledAdapter::new(
                Channel::Email,
                "EMAIL_PROVIDER is disabled",
            )),
        };

        let sms: Arc<dyn ChannelAdapter> = match (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_from_number,
        ) {
            (Some(sid), Some(_), Some(_)) if sid.starts_with("AC") => {
                Arc::new(TwilioSmsAdapter::from_config(config)?)
            }
            _ => Arc::new(DisabledAdapter::new(
                Channel::Sms,
                "Twilio credentials missing or malformed",
            )),
        };

        let push: Arc<dyn ChannelAdapter> = match &config.fcm_project_id {
            Some(project_id) => match GcpTokenSource::discover().await {
                Ok(token_source) => Arc::new(FcmPushAdapter::new(
                    config,
                    project_id.clone(),
                    Arc::new(token_source),
                )?),
                Err(e) => Arc::new(DisabledAdapter::new(
                    Channel::Push,
                    format!("Google service credentials unavailable: {}", e),
                )),
            },
            None => Arc::new(DisabledAdapter::new(Channel::Push, "FCM_PROJECT_ID is not set")),
        };

        let adapters = Self::new(email, sms, push);
        for (channel, adapter) in adapters.iter() {
            info!(
                channel = %channel,
                provider = adapter.provider(),
                enabled = adapter.is_enabled(),
                "Channel adapter ready"
            );
        }
        Ok(adapters)
    }
}
