//! Unified health check types
//!
//! Shared by the storage tiers and the HTTP readiness probe so every
//! component reports in the same shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status for a service or component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component answers but something is off (e.g. cache backend slow)
    Degraded,
    /// Component is not operational
    Unhealthy,
    /// Not yet checked
    Unknown,
}

impl HealthStatus {
    /// Combine two statuses, keeping the worse one.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        fn rank(s: &HealthStatus) -> u8 {
            match s {
                HealthStatus::Healthy => 0,
                HealthStatus::Unknown => 1,
                HealthStatus::Degraded => 2,
                HealthStatus::Unhealthy => 3,
            }
        }
        if rank(&other) > rank(&self) {
            other
        } else {
            self
        }
    }
}

/// Detailed health check result for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthCheck {
    pub status: HealthStatus,
    /// Component name (`event_log`, `fast_cache`, ...)
    pub component: String,
    pub message: Option<String>,
    /// Probe round-trip in milliseconds, if measured
    pub response_time_ms: Option<i64>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            message: None,
            response_time_ms: None,
            metadata: None,
        }
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            component: component.into(),
            message: Some(message.into()),
            response_time_ms: None,
            metadata: None,
        }
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            component: component.into(),
            message: Some(message.into()),
            response_time_ms: None,
            metadata: None,
        }
    }

    pub fn with_response_time(mut self, ms: i64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_status_wins() {
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Unhealthy.worst(HealthStatus::Healthy),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_health_check_serializes_lowercase() {
        let check = HealthCheck::degraded("fast_cache", "slow")
            .with_response_time(42)
            .with_metadata("backend", serde_json::json!("lmdb"));
        let json = serde_json::to_value(&check).expect("serializes");
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["response_time_ms"], 42);
        assert_eq!(json["metadata"]["backend"], "lmdb");
        assert!(!check.is_healthy());
    }
}
