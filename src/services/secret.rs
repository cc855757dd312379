use std::sync::Arc;

use anyhow::Error;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    error::SecretError,
    models::secret::{Secret, SecretFormat, SecretPurpose, StoredSecret},
};

/// External persistence for issued secrets. Only digests ever reach a store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stores `secret`, replacing any live secret for the same recipient and purpose.
    async fn put(&self, secret: &StoredSecret) -> Result<(), Error>;

    /// True only if a live, unexpired secret with this digest exists.
    async fn matches(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        digest: &str,
    ) -> Result<bool, Error>;

    async fn remove(&self, recipient_id: &str, purpose: SecretPurpose) -> Result<(), Error>;

    /// Removes the secret and returns true if it matches, in one atomic step.
    /// Of two concurrent callers holding the same value, at most one sees true.
    async fn take_if_matches(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        digest: &str,
    ) -> Result<bool, Error>;
}

pub fn digest(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Issues and checks one-time secrets. Holds nothing but the store handle.
#[derive(Clone)]
pub struct SecretIssuer {
    store: Arc<dyn SecretStore>,
}

impl SecretIssuer {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    pub async fn issue(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        ttl: TimeDelta,
    ) -> Result<Secret, SecretError> {
        if ttl <= TimeDelta::zero() {
            return Err(SecretError::InvalidTtl);
        }

        let value = generate(purpose.format())?;
        let issued_at = Utc::now();
        let expires_at = issued_at + ttl;

        let stored = StoredSecret {
            recipient_id: recipient_id.to_string(),
            purpose,
            digest: digest(&value),
            issued_at,
            expires_at,
        };

        self.store.put(&stored).await.map_err(SecretError::Store)?;

        info!(
            recipient_id,
            purpose = %purpose,
            store = self.store.name(),
            expires_at = %expires_at,
            "Secret issued"
        );

        Ok(Secret {
            recipient_id: recipient_id.to_string(),
            purpose,
            value,
            issued_at,
            expires_at,
        })
    }

    /// Wrong, expired and never-issued secrets all yield `false`, as do store failures.
    pub async fn verify(&self, recipient_id: &str, purpose: SecretPurpose, candidate: &str) -> bool {
        match self
            .store
            .matches(recipient_id, purpose, &digest(candidate))
            .await
        {
            Ok(valid) => {
                debug!(recipient_id, purpose = %purpose, valid, "Secret verified");
                valid
            }
            Err(e) => {
                warn!(
                    recipient_id,
                    purpose = %purpose,
                    error = %e,
                    "Secret store unavailable during verification"
                );
                false
            }
        }
    }

    /// Verifies and consumes in one step. A store failure is an error, never a success.
    pub async fn redeem(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        candidate: &str,
    ) -> Result<bool, SecretError> {
        let redeemed = self
            .store
            .take_if_matches(recipient_id, purpose, &digest(candidate))
            .await
            .map_err(SecretError::Store)?;

        if redeemed {
            info!(recipient_id, purpose = %purpose, "Secret redeemed");
        } else {
            debug!(recipient_id, purpose = %purpose, "Secret not redeemed");
        }
        Ok(redeemed)
    }

    pub async fn consume(&self, recipient_id: &str, purpose: SecretPurpose) -> Result<(), SecretError> {
        self.store
            .remove(recipient_id, purpose)
            .await
            .map_err(SecretError::Store)?;

        info!(recipient_id, purpose = %purpose, "Secret consumed");
        Ok(())
    }
}

fn generate(format: SecretFormat) -> Result<String, SecretError> {
    match format {
        SecretFormat::NumericCode { digits } => {
            let bound = 10u32.pow(digits);
            // Largest multiple of `bound` below u32::MAX, so `x % bound` stays uniform.
            let zone = (u32::MAX / bound) * bound;
            loop {
                let x = OsRng
                    .try_next_u32()
                    .map_err(|e| SecretError::Entropy(e.to_string()))?;
                if x < zone {
                    return Ok(format!("{:0width$}", x % bound, width = digits as usize));
                }
            }
        }
        SecretFormat::Token { bytes } => {
            let mut buf = vec![0u8; bytes];
            OsRng
                .try_fill_bytes(&mut buf)
                .map_err(|e| SecretError::Entropy(e.to_string()))?;
            Ok(buf.iter().map(|b| format!("{:02x}", b)).collect())
        }
    }
}
