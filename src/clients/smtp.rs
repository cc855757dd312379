use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{self, authentication::Credentials},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    clients::adapter::ChannelAdapter,
    config::Config,
    error::ChannelFailure,
    models::{
        channel::{Channel, ChannelTarget},
        template::RenderedContent,
    },
};

pub struct SmtpEmailAdapter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Option<Mailbox>,
    message_id_domain: String,
}

impl SmtpEmailAdapter {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| anyhow!("SMTP_HOST is required for the smtp provider"))?;

        let mut builder = if config.smtp_use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| anyhow!("Failed to create SMTP relay: {}", e))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        }
        .port(config.smtp_port)
        .timeout(Some(config.channel_timeout()));

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from: Mailbox = format!("{} <{}>", config.app_name, config.mail_from)
            .parse()
            .map_err(|e| anyhow!("Invalid MAIL_FROM address: {}", e))?;
        let reply_to = config
            .mail_reply_to
            .as_deref()
            .map(str::parse::<Mailbox>)
            .transpose()
            .map_err(|e| anyhow!("Invalid MAIL_REPLY_TO address: {}", e))?;

        info!(host, port = config.smtp_port, tls = config.smtp_use_tls, "SMTP adapter initialized");

        Ok(Self {
            transport: builder.build(),
            message_id_domain: from.email.domain().to_string(),
            from,
            reply_to,
        })
    }

    fn build_message(
        &self,
        to: Mailbox,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<(Message, String), ChannelFailure> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.message_id_domain);

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .message_id(Some(message_id.clone()));

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }

        let message = builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .map_err(|e| ChannelFailure::Unknown(format!("Failed to build email message: {}", e)))?;

        Ok((message, message_id))
    }

    fn classify_error(error: &smtp::Error) -> ChannelFailure {
        classify_reply(error.status().map(u16::from), error.to_string())
    }
}

/// Only mailbox-level rejections blame the address. Failed logins and dropped
/// connections happen before any recipient is named.
fn classify_reply(code: Option<u16>, detail: String) -> ChannelFailure {
    match code {
        Some(550 | 551 | 553) => {
            ChannelFailure::InvalidTarget(format!("SMTP rejected recipient: {}", detail))
        }
        Some(530 | 534 | 535 | 538) => {
            ChannelFailure::ProviderUnavailable(format!("SMTP authentication failed: {}", detail))
        }
        None | Some(400..=499) => {
            ChannelFailure::ProviderUnavailable(format!("SMTP send failed: {}", detail))
        }
        Some(_) => ChannelFailure::Unknown(format!("SMTP send failed: {}", detail)),
    }
}

#[async_trait]
impl ChannelAdapter for SmtpEmailAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn provider(&self) -> &'static str {
        "smtp"
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

        let to: Mailbox = target
            .address()
            .parse()
            .map_err(|e| ChannelFailure::InvalidTarget(format!("Invalid to address: {}", e)))?;

        let (message, message_id) = self.build_message(to, subject, html, text)?;

        debug!(subject = %subject, "Sending email via SMTP");

        self.transport
            .send(message)
            .await
            .map_err(|e| Self::classify_error(&e))?;

        info!(message_id = %message_id, "Email sent successfully via SMTP");

        Ok(Some(message_id))
    }
}
