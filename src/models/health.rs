use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered by severity, so the overall status of a set of checks is their maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, ServiceHealth>,
}

/// One dependency or channel as seen by `/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn with_status(status: HealthStatus) -> Self {
        Self {
            status,
            response_time_ms: None,
            provider: None,
            error: None,
        }
    }

    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            response_time_ms: Some(response_time_ms),
            ..Self::with_status(HealthStatus::Healthy)
        }
    }

    pub fn unhealthy(error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::with_status(HealthStatus::Unhealthy)
        }
    }

    pub fn channel_enabled(provider: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            ..Self::with_status(HealthStatus::Healthy)
        }
    }

    /// A channel without credentials degrades the service but does not take it down.
    pub fn channel_disabled(provider: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            error: Some("Provider credentials missing, channel disabled".to_string()),
            ..Self::with_status(HealthStatus::Degraded)
        }
    }
}
