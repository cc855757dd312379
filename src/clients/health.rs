use std::{collections::BTreeMap, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{
        adapter::ChannelAdapters, database::PostgresAuditSink, profile_store::ProfileStoreClient,
        redis::RedisSecretStore,
    },
    config::{AuditSinkBackend, Config, SecretStoreBackend},
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

pub struct HealthChecker {
    config: Config,
    profile_store: ProfileStoreClient,
    adapters: ChannelAdapters,
}

impl HealthChecker {
    pub fn new(config: Config, profile_store: ProfileStoreClient, adapters: ChannelAdapters) -> Self {
        Self {
            config,
            profile_store,
            adapters,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = BTreeMap::new();

        checks.insert("profile_store".to_string(), self.check_profile_store().await);

        if self.config.secret_store == SecretStoreBackend::Redis {
            checks.insert("secret_store".to_string(), self.check_redis().await);
        }

        if self.config.audit_sink == AuditSinkBackend::Postgres {
            checks.insert("audit_sink".to_string(), self.check_database().await);
        }

        for (channel, adapter) in self.adapters.iter() {
            let health = if adapter.is_enabled() {
                ServiceHealth::channel_enabled(adapter.provider())
            } else {
                ServiceHealth::channel_disabled(adapter.provider())
            };
            checks.insert(format!("channel_{}", channel), health);
        }

        HealthCheckResponse {
            status: overall_status(&checks),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_profile_store(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.profile_store.health_check().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Profile store health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Profile store health check failed");
                ServiceHealth::unhealthy(format!("Health check failed: {}", e))
            }
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let Some(redis_url) = self.config.redis_url.as_deref() else {
            return ServiceHealth::unhealthy("REDIS_URL is not set".to_string());
        };
        let start = Instant::now();

        match RedisSecretStore::connect(redis_url).await {
            Ok(store) => match store.ping().await {
                Ok(()) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    debug!(response_time_ms = elapsed, "Redis health check passed");
                    ServiceHealth::healthy(elapsed)
                }
                Err(e) => {
                    warn!(error = %e, "Redis ping failed");
                    ServiceHealth::unhealthy(e.to_string())
                }
            },
            Err(e) => {
                warn!(error = %e, "Redis connection failed");
                ServiceHealth::unhealthy(format!("Connection failed: {}", e))
            }
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let Some(database_url) = self.config.database_url.as_deref() else {
            return ServiceHealth::unhealthy("DATABASE_URL is not set".to_string());
        };
        let start = Instant::now();

        match PostgresAuditSink::connect(database_url).await {
            Ok(sink) => match sink.health_check().await {
                Ok(()) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    debug!(response_time_ms = elapsed, "Database health check passed");
                    ServiceHealth::healthy(elapsed)
                }
                Err(e) => {
                    warn!(error = %e, "Database health check failed");
                    ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
                }
            },
            Err(e) => {
                warn!(error = %e, "Database connection failed");
                ServiceHealth::unhealthy(format!("Connection failed: {}", e))
            }
        }
    }
}

/// Any unhealthy dependency makes the service unhealthy; a disabled channel only degrades it.
pub fn overall_status(checks: &BTreeMap<String, ServiceHealth>) -> HealthStatus {
    checks
        .values()
        .map(|health| health.status)
        .max()
        .unwrap_or(HealthStatus::Healthy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_channel_degrades() {
        let mut checks = BTreeMap::new();
        checks.insert("profile_store".to_string(), ServiceHealth::healthy(3));
        checks.insert("channel_sms".to_string(), ServiceHealth::channel_enabled("twilio"));
        assert_eq!(overall_status(&checks), HealthStatus::Healthy);

        checks.insert("channel_push".to_string(), ServiceHealth::channel_disabled("disabled"));
        assert_eq!(overall_status(&checks), HealthStatus::Degraded);

        checks.insert(
            "profile_store".to_string(),
            ServiceHealth::unhealthy("connection refused".to_string()),
        );
        assert_eq!(overall_status(&checks), HealthStatus::Unhealthy);
    }
}
