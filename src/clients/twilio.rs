use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::{
    clients::adapter::ChannelAdapter,
    config::Config,
    error::ChannelFailure,
    models::{
        channel::{Channel, ChannelTarget},
        template::RenderedContent,
        twilio::{TwilioErrorResponse, TwilioMessageForm, TwilioMessageResponse},
        validation::normalize_phone_number,
    },
};

/// Single SMS segment; longer bodies are split by the carrier.
const SMS_SEGMENT_CHARS: usize = 160;

#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

pub struct TwilioSmsAdapter {
    http_client: Client,
    api_url: String,
    credentials: TwilioCredentials,
    default_country_code: String,
}

impl TwilioSmsAdapter {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let credentials = match (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_from_number,
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => TwilioCredentials {
                account_sid: account_sid.clone(),
                auth_token: auth_token.clone(),
                from_number: from_number.clone(),
            },
            _ => return Err(anyhow!("Twilio credentials are incomplete")),
        };

        let http_client = Client::builder()
            .timeout(config.channel_timeout())
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(from = %credentials.from_number, "Twilio adapter initialized");

        Ok(Self::new(
            http_client,
            &config.twilio_api_url,
            credentials,
            &config.default_country_code,
        ))
    }

    pub fn new(
        http_client: Client,
        api_url: &str,
        credentials: TwilioCredentials,
        default_country_code: &str,
    ) -> Self {
        Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            credentials,
            default_country_code: default_country_code.to_string(),
        }
    }

    fn classify_error(status: StatusCode, body: &str) -> ChannelFailure {
        let parsed = serde_json::from_str::<TwilioErrorResponse>(body).ok();
        let message = match &parsed {
            Some(err) => format!("Twilio error {:?}: {}", err.code, err.message),
            None => format!("Twilio returned {}: {}", status, body),
        };

        match parsed {
            Some(err) if err.is_invalid_destination() => ChannelFailure::InvalidTarget(message),
            Some(err) if err.is_rate_limited() => ChannelFailure::RateLimited(message),
            _ if status == StatusCode::TOO_MANY_REQUESTS => ChannelFailure::RateLimited(message),
            _ if status == StatusCode::UNAUTHORIZED
                || status == StatusCode::FORBIDDEN
                || status.is_server_error() =>
            {
                ChannelFailure::ProviderUnavailable(message)
            }
            _ => ChannelFailure::Unknown(message),
        }
    }
}

#[async_trait]
impl ChannelAdapter for TwilioSmsAdapter {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    fn provider(&self) -> &'static str {
        "twilio"
    }

    async fn deliver(
        &self,
        target: &ChannelTarget,
        content: &RenderedContent,
    ) -> Result<Option<String>, ChannelFailure> {
        let RenderedContent::Sms { body } = content else {
            return Err(ChannelFailure::Unknown("expected sms content".to_string()));
        };

        let to = normalize_phone_number(target.address(), &self.default_country_code)
            .map_err(|e| ChannelFailure::InvalidTarget(e.to_string()))?;

        if body.chars().count() > SMS_SEGMENT_CHARS {
            warn!(
                length = body.chars().count(),
                "SMS body exceeds a single segment"
            );
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_url, self.credentials.account_sid
        );
        let form = TwilioMessageForm {
            to: &to,
            from: &self.credentials.from_number,
            body,
        };

        debug!(to = %to, "Sending Twilio SMS");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(
                &self.credentials.account_sid,
                Some(&self.credentials.auth_token),
            )
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let sent: TwilioMessageResponse = response.json().await?;
            info!(sid = %sent.sid, status = ?sent.status, "Twilio SMS accepted");
            Ok(Some(sent.sid))
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(Self::classify_error(status, &error_text))
        }
    }
}
