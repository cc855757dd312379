use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::{
    clients::adapter::ChannelAdapter,
    config::Config,
    error::ChannelFailure,
    models::{
        channel::{Channel, ChannelTarget},
        mailgun::{MailgunErrorResponse, MailgunMessageForm, MailgunResponse},
        template::RenderedContent,
        validation::validate_email_address,
    },
};

pub struct MailgunEmailAdapter {
    http_client: Client,
    api_url: String,
    domain: String,
    api_key: String,
    from: String,
    reply_to: Option<String>,
}

impl MailgunEmailAdapter {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let (api_key, domain) = match (&config.mailgun_api_key, &config.mailgun_domain) {
            (Some(key), Some(domain)) => (key.clone(), domain.clone()),
            _ => return Err(anyhow!("Mailgun API key and domain are required")),
        };

        let http_client = Client::builder()
            .timeout(config.channel_timeout())
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(domain = %domain, "Mailgun adapter initialized");

        Ok(Self {
            http_client,
            api_url: config.mailgun_api_url.trim_end_matches('/').to_string(),
            domain,
            api_key,
            from: format!("{} <{}>", config.app_name, config.mail_from),
            reply_to: config.mail_reply_to.clone(),
        })
    }

    pub fn new(http_client: Client, api_url: &str, domain: &str, api_key: &str, from: &str) -> Self {
        Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            domain: domain.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
            reply_to: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self
    }

    fn classify_error(status: StatusCode, body: &str) -> ChannelFailure {
        let detail = serde_json::from_str::<MailgunErrorResponse>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.to_string());
        let message = format!("Mailgun returned {}: {}", status, detail);

        match status {
            StatusCode::BAD_REQUEST => ChannelFailure::InvalidTarget(message),
            StatusCode::TOO_MANY_REQUESTS => ChannelFailure::RateLimited(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ChannelFailure::ProviderUnavailable(message)
            }
            s if s.is_server_error() => ChannelFailure::ProviderUnavailable(message),
            _ => ChannelFailure::Unknown(message),
        }
    }
}

#[async_trait]
impl ChannelAdapter for MailgunEmailAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn provider(&self) -> &'static str {
        "mailgun"
    }

    async fn deliver(
        &self,
        target: &ChannelTarget,
        content: &RenderedContent,
    ) -> Result<Option<String>, ChannelFailure> {
        let RenderedContent::Email {
            subject,
            html,
            text,
        } = content
        else {
            return Err(ChannelFailure::Unknown("expected email content".to_string()));
        };
        let to = target.address();

        validate_email_address(to).map_err(|e| ChannelFailure::InvalidTarget(e.to_string()))?;

        let form = MailgunMessageForm {
            from: &self.from,
            to,
            subject,
            text,
            html,
            reply_to: self.reply_to.as_deref(),
        };
        let url = format!("{}/{}/messages", self.api_url, self.domain);

        debug!(subject = %subject, "Sending Mailgun email");

        let response = self
            .http_client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let sent: MailgunResponse = response.json().await?;
            info!(message_id = %sent.id, "Mailgun email queued");
            Ok(Some(sent.id))
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(Self::classify_error(status, &error_text))
        }
    }
}
