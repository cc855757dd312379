use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::{
    clients::adapter::ChannelAdapter,
    config::Config,
    error::ChannelFailure,
    models::{
        channel::{Channel, ChannelTarget},
        fcm::{FcmErrorResponse, FcmMessage, FcmNotification, FcmRequest, FcmResponse},
        template::RenderedContent,
        validation::validate_push_token,
    },
};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

/// Source of OAuth bearer tokens for the FCM v1 API.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, Error>;
}

/// Application default credentials resolved through `gcp_auth`.
pub struct GcpTokenSource {
    provider: Arc<dyn TokenProvider>,
}

impl GcpTokenSource {
    pub async fn discover() -> Result<Self, Error> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| anyhow!("Failed to resolve Google credentials: {}", e))?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl AccessTokenSource for GcpTokenSource {
    async fn access_token(&self) -> Result<String, Error> {
        let token = self.provider.token(FCM_SCOPES).await?;
        Ok(token.as_str().to_string())
    }
}

/// Fixed bearer token, for emulators and tests.
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, Error> {
        Ok(self.0.clone())
    }
}

pub struct FcmPushAdapter {
    http_client: Client,
    api_url: String,
    project_id: String,
    token_source: Arc<dyn AccessTokenSource>,
}

impl FcmPushAdapter {
    pub fn new(
        config: &Config,
        project_id: String,
        token_source: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(config.channel_timeout())
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(project_id = %project_id, "FCM adapter initialized");

        Ok(Self {
            http_client,
            api_url: config.fcm_api_url.trim_end_matches('/').to_string(),
            project_id,
            token_source,
        })
    }

    pub fn with_client(
        http_client: Client,
        api_url: &str,
        project_id: &str,
        token_source: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            token_source,
        }
    }

    /// Only `UNREGISTERED`, or `INVALID_ARGUMENT` naming `message.token`, marks the token stale.
    /// A bare 404 means the endpoint or project is wrong, not the device.
    fn classify_error(status: StatusCode, body: &str) -> ChannelFailure {
        let parsed = serde_json::from_str::<FcmErrorResponse>(body).ok();
        let (code, token_rejected) = parsed
            .as_ref()
            .map(|r| {
                let code = r
                    .error
                    .fcm_error_code()
                    .unwrap_or(r.error.status.as_str())
                    .to_string();
                (code, r.error.rejects_token())
            })
            .unwrap_or_default();
        let message = match parsed {
            Some(r) if !r.error.message.is_empty() => format!("{}: {}", code, r.error.message),
            _ => format!("FCM returned {}: {}", status, body),
        };

        match (code.as_str(), status.as_u16()) {
            ("UNREGISTERED", _) => ChannelFailure::InvalidTarget(message),
            ("INVALID_ARGUMENT", _) if token_rejected => ChannelFailure::InvalidTarget(message),
            ("QUOTA_EXCEEDED" | "RESOURCE_EXHAUSTED", _) | (_, 429) => {
                ChannelFailure::RateLimited(message)
            }
            (
                "UNAVAILABLE" | "INTERNAL" | "THIRD_PARTY_AUTH_ERROR" | "UNAUTHENTICATED"
                | "PERMISSION_DENIED" | "SENDER_ID_MISMATCH" | "NOT_FOUND",
                _,
            )
            | (_, 401 | 403 | 404 | 500..=599) => ChannelFailure::ProviderUnavailable(message),
            _ => ChannelFailure::Unknown(message),
        }
    }
}

#[async_trait]
impl ChannelAdapter for FcmPushAdapter {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn provider(&self) -> &'static str {
        "fcm"
    }

    async fn deliver(
        &self,
        target: &ChannelTarget,
        content: &RenderedContent,
    ) -> Result<Option<String>, ChannelFailure> {
        let RenderedContent::Push { title, body, data } = content else {
            return Err(ChannelFailure::Unknown("expected push content".to_string()));
        };
        let device_token = target.address();

        validate_push_token(device_token)
            .map_err(|e| ChannelFailure::InvalidTarget(e.to_string()))?;

        let bearer = self
            .token_source
            .access_token()
            .await
            .map_err(|e| ChannelFailure::ProviderUnavailable(e.to_string()))?;

        let request = FcmRequest {
            message: FcmMessage {
                token: device_token.to_string(),
                notification: FcmNotification {
                    title: title.clone(),
                    body: body.clone(),
                },
                data: data.clone(),
            },
        };

        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.api_url, self.project_id
        );

        debug!(data_keys = data.len(), "Sending FCM push notification");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(bearer)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let sent: FcmResponse = response.json().await?;
            let message_id = sent.name.rsplit('/').next().map(str::to_string);
            info!(message_id = ?message_id, "FCM push notification sent successfully");
            Ok(message_id)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(Self::classify_error(status, &error_text))
        }
    }
}
