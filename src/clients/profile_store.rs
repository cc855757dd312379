use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    error::ProfileStoreError,
    models::{
        audit::DeliveryRecord,
        channel::Channel,
        recipient::Recipient,
        secret::{SecretLookup, SecretLookupResponse, SecretPurpose, StoredSecret},
    },
    services::{recorder::DeliverySink, secret::SecretStore},
};

/// HTTP client for the external profile/token store.
///
/// Serves recipient lookups, secret persistence, delivery logs and channel validity updates.
#[derive(Clone)]
pub struct ProfileStoreClient {
    http_client: Client,
    base_url: Url,
    api_key: String,
}

impl ProfileStoreClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, Error> {
        let base_url =
            Url::parse(base_url).map_err(|e| anyhow!("Invalid profile store URL: {}", e))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Profile store URL cannot be used as a base"));
        }

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %base_url, "Profile store client initialized");

        Ok(Self {
            http_client,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ProfileStoreError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ProfileStoreError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProfileStoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    pub async fn get_recipient(&self, recipient_id: &str) -> Result<Recipient, ProfileStoreError> {
        debug!(recipient_id, "Fetching recipient profile");
        let response = self
            .execute(self.http_client.get(self.url(&["users", recipient_id])))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn find_recipient_by_email(&self, email: &str) -> Result<Recipient, ProfileStoreError> {
        debug!("Fetching recipient profile by email");
        let response = self
            .execute(self.http_client.get(self.url(&["users", "email", email])))
            .await?;
        Ok(response.json().await?)
    }

    /// Flags the recipient's contact for `channel` as no longer deliverable.
    pub async fn mark_channel_invalid(
        &self,
        recipient_id: &str,
        channel: Channel,
    ) -> Result<(), ProfileStoreError> {
        self.execute(
            self.http_client
                .patch(self.url(&["users", recipient_id, "channels", channel.as_str()]))
                .json(&json!({ "valid": false })),
        )
        .await?;

        info!(recipient_id, channel = %channel, "Channel marked invalid in profile store");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), ProfileStoreError> {
        self.execute(self.http_client.get(self.url(&["health"])))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for ProfileStoreClient {
    fn name(&self) -> &'static str {
        "profile_store"
    }

    async fn put(&self, secret: &StoredSecret) -> Result<(), Error> {
        self.execute(self.http_client.post(self.url(&["secrets"])).json(secret))
            .await?;
        Ok(())
    }

    async fn matches(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        digest: &str,
    ) -> Result<bool, Error> {
        let lookup = SecretLookup {
            recipient_id,
            purpose,
            digest,
        };

        match self
            .execute(
                self.http_client
                    .post(self.url(&["secrets", "verify"]))
                    .json(&lookup),
            )
            .await
        {
            Ok(response) => {
                let body: SecretLookupResponse = response.json().await?;
                Ok(body.valid)
            }
            Err(ProfileStoreError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, recipient_id: &str, purpose: SecretPurpose) -> Result<(), Error> {
        match self
            .execute(
                self.http_client
                    .delete(self.url(&["secrets", recipient_id, purpose.as_str()])),
            )
            .await
        {
            Ok(_) | Err(ProfileStoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The store deletes the secret and reports `valid` in the same request.
    async fn take_if_matches(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        digest: &str,
    ) -> Result<bool, Error> {
        let lookup = SecretLookup {
            recipient_id,
            purpose,
            digest,
        };

        match self
            .execute(
                self.http_client
                    .post(self.url(&["secrets", "consume"]))
                    .json(&lookup),
            )
            .await
        {
            Ok(response) => {
                let body: SecretLookupResponse = response.json().await?;
                Ok(body.valid)
            }
            Err(ProfileStoreError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DeliverySink for ProfileStoreClient {
    fn name(&self) -> &'static str {
        "profile_store"
    }

    async fn write(&self, record: &DeliveryRecord) -> Result<(), Error> {
        self.execute(self.http_client.post(self.url(&["notifications"])).json(record))
            .await?;
        Ok(())
    }
}
