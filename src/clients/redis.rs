use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::{
    models::secret::{SecretPurpose, StoredSecret},
    services::secret::SecretStore,
};

/// Deletes the entry only if its stored digest equals ARGV[1].
const TAKE_IF_MATCHES: &str = r"
local value = redis.call('GET', KEYS[1])
if not value then
    return 0
end
local ok, entry = pcall(cjson.decode, value)
if ok and entry.digest == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return 0
";

/// Secret store keyed `secret:{purpose}:{recipient_id}`; Redis expires entries on its own.
pub struct RedisSecretStore {
    connection: MultiplexedConnection,
}

impl RedisSecretStore {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client =
            Client::open(redis_url).map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self { connection })
    }

    fn key(recipient_id: &str, purpose: SecretPurpose) -> String {
        format!("secret:{}:{}", purpose, recipient_id)
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Ping failed: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for RedisSecretStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn put(&self, secret: &StoredSecret) -> Result<(), Error> {
        let key = Self::key(&secret.recipient_id, secret.purpose);
        let ttl_ms = (secret.expires_at - Utc::now()).num_milliseconds();
        if ttl_ms <= 0 {
            return Err(anyhow!("Secret already expired before it was stored"));
        }
        let value = serde_json::to_string(secret)?;

        let mut conn = self.connection.clone();
        conn.pset_ex::<_, _, ()>(&key, value, ttl_ms as u64)
            .await
            .map_err(|e| anyhow!("Failed to store secret: {}", e))?;

        debug!(key = %key, ttl_ms, "Secret stored in Redis");
        Ok(())
    }

    async fn matches(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        digest: &str,
    ) -> Result<bool, Error> {
        let key = Self::key(recipient_id, purpose);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| anyhow!("Failed to read secret: {}", e))?;

        let stored = match value.map(|v| serde_json::from_str::<StoredSecret>(&v)) {
            Some(Ok(stored)) => Some(stored),
            Some(Err(e)) => {
                warn!(key = %key, error = %e, "Unreadable secret entry");
                None
            }
            None => None,
        };

        let (stored_digest, live) = match &stored {
            Some(secret) => (secret.digest.as_str(), !secret.is_expired_at(Utc::now())),
            None => (digest, false),
        };

        let equal: bool = stored_digest.as_bytes().ct_eq(digest.as_bytes()).into();
        Ok(equal & live)
    }

    async fn remove(&self, recipient_id: &str, purpose: SecretPurpose) -> Result<(), Error> {
        let key = Self::key(recipient_id, purpose);
        let mut conn = self.connection.clone();

        conn.del::<_, ()>(&key)
            .await
            .map_err(|e| anyhow!("Failed to delete secret: {}", e))?;

        Ok(())
    }

    async fn take_if_matches(
        &self,
        recipient_id: &str,
        purpose: SecretPurpose,
        digest: &str,
    ) -> Result<bool, Error> {
        let key = Self::key(recipient_id, purpose);
        let mut conn = self.connection.clone();

        let taken: i32 = redis::Script::new(TAKE_IF_MATCHES)
            .key(&key)
            .arg(digest)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed to redeem secret: {}", e))?;

        debug!(key = %key, taken, "Secret redemption attempted");
        Ok(taken == 1)
    }
}
