//! Fan-out of one notification event to every channel it can reach.
//!
//! A dispatch computes the eligible channel set, issues the secret the event needs (the only
//! step that can fail the whole dispatch), then attempts every eligible channel in its own
//! task. Each attempt renders, sends under its own timeout, and ends as a [`ChannelOutcome`]
//! whatever happens. Audit writes are spawned after the join and never awaited.

use std::{sync::Arc, time::Duration};

use chrono::TimeDelta;
use futures_util::future::join_all;
use reqwest::Url;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    clients::{adapter::ChannelAdapters, template::TemplateRenderer},
    config::Config,
    error::DispatchError,
    models::{
        channel::{Channel, ChannelErrorCode, ChannelOutcome, ChannelTarget},
        dispatch::{DeliveryContext, DispatchResult},
        event::NotificationEvent,
        recipient::Recipient,
        secret::{Secret, SecretPurpose},
    },
    services::{recorder::DeliveryRecorder, secret::SecretIssuer},
};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub app_name: String,
    pub frontend_url: String,
    pub channel_timeout: Duration,
    pub secret_timeout: Duration,
    pub reset_code_ttl: TimeDelta,
    pub verification_token_ttl: TimeDelta,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            app_name: "RoadTrip".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            channel_timeout: Duration::from_secs(8),
            secret_timeout: Duration::from_secs(5),
            reset_code_ttl: TimeDelta::minutes(15),
            verification_token_ttl: TimeDelta::hours(24),
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_name: config.app_name.clone(),
            frontend_url: config.frontend_url.clone(),
            channel_timeout: config.channel_timeout(),
            secret_timeout: config.secret_timeout(),
            reset_code_ttl: TimeDelta::seconds(config.reset_code_ttl_seconds),
            verification_token_ttl: TimeDelta::seconds(config.verification_token_ttl_seconds),
        }
    }

    pub fn ttl_for(&self, purpose: SecretPurpose) -> TimeDelta {
        match purpose {
            SecretPurpose::PasswordReset => self.reset_code_ttl,
            SecretPurpose::AccountVerification => self.verification_token_ttl,
        }
    }
}

/// Stateless between calls; clones share the same renderer, adapters and stores.
#[derive(Clone)]
pub struct Dispatcher {
    renderer: Arc<TemplateRenderer>,
    adapters: ChannelAdapters,
    issuer: SecretIssuer,
    recorder: DeliveryRecorder,
    settings: Arc<DispatchSettings>,
}

impl Dispatcher {
    pub fn new(
        renderer: Arc<TemplateRenderer>,
        adapters: ChannelAdapters,
        issuer: SecretIssuer,
        recorder: DeliveryRecorder,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            renderer,
            adapters,
            issuer,
            recorder,
            settings: Arc::new(settings),
        }
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    pub fn adapters(&self) -> &ChannelAdapters {
        &self.adapters
    }

    pub fn issuer(&self) -> &SecretIssuer {
        &self.issuer
    }

    /// Channels the event may use and the recipient can be reached on, in canonical order.
    pub fn eligible_targets(event: &NotificationEvent, recipient: &Recipient) -> Vec<ChannelTarget> {
        event
            .policy
            .channels()
            .filter_map(|channel| recipient.target_for(channel))
            .collect()
    }

    pub async fn dispatch(
        &self,
        event: &NotificationEvent,
        recipient: &Recipient,
    ) -> Result<DispatchResult, DispatchError> {
        let mut result = DispatchResult::empty(event);
        let targets = Self::eligible_targets(event, recipient);

        if targets.is_empty() {
            info!(
                event_id = %event.id,
                event_kind = %event.kind,
                recipient_id = %recipient.id,
                "No deliverable channel for recipient"
            );
            return Ok(result);
        }

        let mut data = event.payload.clone();
        data.entry("app_name")
            .or_insert_with(|| Value::String(self.settings.app_name.clone()));
        if let Some(first_name) = &recipient.first_name {
            data.entry("first_name")
                .or_insert_with(|| Value::String(first_name.clone()));
        }

        if let Some(purpose) = event.kind.secret_purpose() {
            let secret = timeout(
                self.settings.secret_timeout,
                self.issuer
                    .issue(&recipient.id, purpose, self.settings.ttl_for(purpose)),
            )
            .await
            .map_err(|_| DispatchError::SecretIssuanceTimeout(self.settings.secret_timeout))??;

            inject_secret(&mut data, &secret, &self.settings.frontend_url);
            result.secret_expires_at = Some(secret.expires_at);
        }

        let data = Arc::new(data);
        let template_id: Arc<str> = Arc::from(event.template_id());

        debug!(
            event_id = %event.id,
            channels = ?targets.iter().map(ChannelTarget::channel).collect::<Vec<_>>(),
            "Dispatching to eligible channels"
        );

        let attempts = targets.into_iter().map(|target| {
            let channel = target.channel();
            let handle = tokio::spawn(attempt(
                Arc::clone(&self.renderer),
                self.adapters.clone(),
                Arc::clone(&template_id),
                target,
                Arc::clone(&data),
                self.settings.channel_timeout,
            ));

            async move {
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => ChannelOutcome::failed(
                        channel,
                        ChannelErrorCode::Unknown,
                        format!("channel attempt aborted: {}", e),
                    ),
                }
            }
        });

        for outcome in join_all(attempts).await {
            result.outcomes.insert(outcome.channel, outcome);
        }

        let context = DeliveryContext {
            event_id: event.id,
            recipient_id: recipient.id.clone(),
            event_kind: event.kind,
            template_id: template_id.to_string(),
        };
        for outcome in result.outcomes.values() {
            self.recorder.record(outcome, &context);
        }

        info!(
            event_id = %event.id,
            event_kind = %event.kind,
            recipient_id = %recipient.id,
            delivered = result.success_count(),
            failed = result.failure_count(),
            "Dispatch completed"
        );

        Ok(result)
    }
}

async fn attempt(
    renderer: Arc<TemplateRenderer>,
    adapters: ChannelAdapters,
    template_id: Arc<str>,
    target: ChannelTarget,
    data: Arc<Map<String, Value>>,
    channel_timeout: Duration,
) -> ChannelOutcome {
    let channel = target.channel();

    let content = match renderer.render(&template_id, channel, &data) {
        Ok(content) => content,
        Err(e) => {
            warn!(channel = %channel, error = %e, "Template rendering failed");
            return ChannelOutcome::failed(channel, e.code(), e.to_string());
        }
    };

    let adapter = adapters.get(channel);
    match timeout(channel_timeout, adapter.send(&target, &content)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                channel = %channel,
                provider = adapter.provider(),
                timeout_ms = channel_timeout.as_millis() as u64,
                "Channel attempt timed out"
            );
            ChannelOutcome::failed(
                channel,
                ChannelErrorCode::ProviderUnavailable,
                format!("{} provider did not answer within {:?}", channel, channel_timeout),
            )
        }
    }
}

/// Secret fields always overwrite payload keys of the same name.
fn inject_secret(data: &mut Map<String, Value>, secret: &Secret, frontend_url: &str) {
    match secret.purpose {
        SecretPurpose::PasswordReset => {
            data.insert("code".to_string(), Value::String(secret.value.clone()));
        }
        SecretPurpose::AccountVerification => {
            data.insert("token".to_string(), Value::String(secret.value.clone()));
            data.insert(
                "verification_link".to_string(),
                Value::String(verification_link(
                    frontend_url,
                    &secret.value,
                    &secret.recipient_id,
                )),
            );
        }
    }

    let minutes = (secret.expires_at - secret.issued_at).num_minutes();
    data.insert("expires_in_minutes".to_string(), Value::from(minutes));
}

fn verification_link(frontend_url: &str, token: &str, recipient_id: &str) -> String {
    let base = format!("{}/confirm-email", frontend_url.trim_end_matches('/'));
    match Url::parse_with_params(&base, &[("token", token), ("userId", recipient_id)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}?token={}&userId={}", base, token, recipient_id),
    }
}

/// Channels in `result` that failed because the target itself is unusable.
pub fn invalid_targets(result: &DispatchResult) -> impl Iterator<Item = Channel> + '_ {
    result
        .outcomes
        .values()
        .filter(|outcome| outcome.is_invalid_target())
        .map(|outcome| outcome.channel)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn verification_link_is_query_encoded() {
        assert_eq!(
            verification_link("https://app.example.com/", "ab12", "user 7"),
            "https://app.example.com/confirm-email?token=ab12&userId=user+7"
        );
    }

    #[test]
    fn secret_fields_overwrite_payload() {
        let issued_at = Utc::now();
        let secret = Secret {
            recipient_id: "u-1".to_string(),
            purpose: SecretPurpose::PasswordReset,
            value: "042917".to_string(),
            issued_at,
            expires_at: issued_at + TimeDelta::minutes(15),
        };
        let mut data = Map::new();
        data.insert("code".to_string(), Value::String("000000".to_string()));

        inject_secret(&mut data, &secret, "http://localhost:3000");

        assert_eq!(data["code"], "042917");
        assert_eq!(data["expires_in_minutes"], 15);
        assert!(!data.contains_key("verification_link"));
    }

    #[test]
    fn ttl_per_purpose() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.ttl_for(SecretPurpose::PasswordReset), TimeDelta::minutes(15));
        assert_eq!(
            settings.ttl_for(SecretPurpose::AccountVerification),
            TimeDelta::hours(24)
        );
    }
}
