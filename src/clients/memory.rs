use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::{
    models::secret::{SecretPurpose, StoredSecret},
    services::secret::SecretStore,
};

type Entries = HashMap<(String, SecretPurpose), StoredSecret>;

/// In-process secret store for development and tests.
///
/// Expired entries are dropped on every write and whenever a lookup finds one.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<Entries>,
}

fn lock_entries(mutex: &Mutex<Entries>) -> Result<MutexGuard<'_, Entries>, Error> {
    mutex
        .lock()
        .map_err(|e| anyhow!("secret store lock poisoned: {}", e))
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock_entries(&self.entries).map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored digests, for inspection in tests.
    pub fn digests(&self) -> Vec<String> {
        lock_entries(&self.entries)
            .map(|e| e.values().map(|s| s.digest.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, secret: &StoredSecret) -> Result<(), Error> {
        let mut entries = lock_entries(&self.entries)?;
        let now = Utc::now();
        entries.retain(|_, stored| !stored.is_expired_at(now));
        entries.insert(
            (secret.recipient_id.clone(), secret.purpose),
            secret.clone(),
        );
        Ok(())
    }

    async fn matches(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        digest: &str,
    ) -> Result<bool, Error> {
        let mut entries = lock_entries(&self.entries)?;
        Ok(live_match(&mut entries, recipient_id, purpose, digest).is_some())
    }

    async fn remove(&self, recipient_id: &str, purpose: SecretPurpose) -> Result<(), Error> {
        let mut entries = lock_entries(&self.entries)?;
        entries.remove(&(recipient_id.to_string(), purpose));
        Ok(())
    }

    async fn take_if_matches(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        digest: &str,
    ) -> Result<bool, Error> {
        let mut entries = lock_entries(&self.entries)?;
        match live_match(&mut entries, recipient_id, purpose, digest) {
            Some(key) => Ok(entries.remove(&key).is_some()),
            None => Ok(false),
        }
    }
}

/// Key of the live entry whose digest equals `digest`. An expired entry is evicted.
fn live_match(
    entries: &mut Entries,
    recipient_id: &str,
    purpose: SecretPurpose,
    digest: &str,
) -> Option<(String, SecretPurpose)> {
    let key = (recipient_id.to_string(), purpose);
    let now = Utc::now();

    let (equal, live) = match entries.get(&key) {
        Some(secret) => (
            bool::from(secret.digest.as_bytes().ct_eq(digest.as_bytes())),
            !secret.is_expired_at(now),
        ),
        None => (bool::from(digest.as_bytes().ct_eq(digest.as_bytes())), false),
    };

    if !live {
        entries.remove(&key);
        return None;
    }
    equal.then_some(key)
}
