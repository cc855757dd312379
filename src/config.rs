use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecretStoreBackend {
    #[default]
    ProfileStore,
    Redis,
    Memory,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkBackend {
    #[default]
    ProfileStore,
    Postgres,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmailProviderKind {
    Mailgun,
    Smtp,
    #[default]
    Disabled,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    pub profile_store_url: String,
    pub profile_store_api_key: String,
    #[serde(default = "default_profile_store_timeout_ms")]
    pub profile_store_timeout_ms: u64,

    #[serde(default)]
    pub secret_store: SecretStoreBackend,
    pub redis_url: Option<String>,

    #[serde(default)]
    pub audit_sink: AuditSinkBackend,
    pub database_url: Option<String>,

    #[serde(default = "default_channel_timeout_ms")]
    pub channel_timeout_ms: u64,
    #[serde(default = "default_secret_timeout_ms")]
    pub secret_timeout_ms: u64,
    #[serde(default = "default_reset_code_ttl_seconds")]
    pub reset_code_ttl_seconds: i64,
    #[serde(default = "default_verification_token_ttl_seconds")]
    pub verification_token_ttl_seconds: i64,

    #[serde(default = "default_audit_retry_max_attempts")]
    pub audit_retry_max_attempts: u32,
    #[serde(default = "default_audit_retry_initial_delay_ms")]
    pub audit_retry_initial_delay_ms: u64,
    #[serde(default = "default_audit_retry_max_delay_ms")]
    pub audit_retry_max_delay_ms: u64,
    #[serde(default = "default_audit_retry_backoff_multiplier")]
    pub audit_retry_backoff_multiplier: u64,

    #[serde(default)]
    pub email_provider: EmailProviderKind,
    #[serde(default = "default_mail_from")]
    pub mail_from: String,
    pub mail_reply_to: Option<String>,

    pub mailgun_api_key: Option<String>,
    pub mailgun_domain: Option<String>,
    #[serde(default = "default_mailgun_api_url")]
    pub mailgun_api_url: String,

    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_use_tls")]
    pub smtp_use_tls: bool,

    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
    #[serde(default = "default_twilio_api_url")]
    pub twilio_api_url: String,
    #[serde(default = "default_country_code")]
    pub default_country_code: String,

    pub fcm_project_id: Option<String>,
    #[serde(default = "default_fcm_api_url")]
    pub fcm_api_url: String,
}

fn default_server_port() -> u16 {
    8080
}

fn default_app_name() -> String {
    "RoadTrip".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_profile_store_timeout_ms() -> u64 {
    5_000
}

fn default_channel_timeout_ms() -> u64 {
    8_000
}

fn default_secret_timeout_ms() -> u64 {
    5_000
}

fn default_reset_code_ttl_seconds() -> i64 {
    15 * 60
}

fn default_verification_token_ttl_seconds() -> i64 {
    24 * 60 * 60
}

fn default_audit_retry_max_attempts() -> u32 {
    3
}

fn default_audit_retry_initial_delay_ms() -> u64 {
    200
}

fn default_audit_retry_max_delay_ms() -> u64 {
    2_000
}

fn default_audit_retry_backoff_multiplier() -> u64 {
    2
}

fn default_mail_from() -> String {
    "contact@yourapp.com".to_string()
}

fn default_mailgun_api_url() -> String {
    "https://api.mailgun.net/v3".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_use_tls() -> bool {
    true
}

fn default_twilio_api_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_country_code() -> String {
    "33".to_string()
}

fn default_fcm_api_url() -> String {
    "https://fcm.googleapis.com".to_string()
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks envy cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_store == SecretStoreBackend::Redis && self.redis_url.is_none() {
            return Err(anyhow!("REDIS_URL is required when SECRET_STORE=redis"));
        }
        if self.audit_sink == AuditSinkBackend::Postgres && self.database_url.is_none() {
            return Err(anyhow!("DATABASE_URL is required when AUDIT_SINK=postgres"));
        }
        if self.reset_code_ttl_seconds <= 0 || self.verification_token_ttl_seconds <= 0 {
            return Err(anyhow!("Secret lifetimes must be positive"));
        }
        if self.audit_retry_max_attempts == 0 {
            return Err(anyhow!("AUDIT_RETRY_MAX_ATTEMPTS must be at least 1"));
        }
        Ok(())
    }

    pub fn audit_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.audit_retry_max_attempts,
            initial_delay_ms: self.audit_retry_initial_delay_ms,
            max_delay_ms: self.audit_retry_max_delay_ms,
            backoff_multiplier: self.audit_retry_backoff_multiplier,
        }
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }

    pub fn secret_timeout(&self) -> Duration {
        Duration::from_millis(self.secret_timeout_ms)
    }

    pub fn profile_store_timeout(&self) -> Duration {
        Duration::from_millis(self.profile_store_timeout_ms)
    }
}
