use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::System;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    domain::config::storage::ProviderType,
    resilience::{
        circuit_breaker::{CircuitBreakerManager, CircuitPhase},
        failover::ProviderCandidate,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    #[serde(rename = "providerType")]
    pub provider_type: ProviderType,
    pub active: bool,
    pub healthy: bool,
    pub circuit: CircuitPhase,
    #[serde(rename = "responseTimeMs")]
    pub response_time_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    #[serde(rename = "cpuUsagePercent")]
    pub cpu_usage_percent: f32,
    #[serde(rename = "memoryUsedBytes")]
    pub memory_used_bytes: u64,
    #[serde(rename = "memoryTotalBytes")]
    pub memory_total_bytes: u64,
    #[serde(rename = "memoryUsagePercent")]
    pub memory_usage_percent: f32,
}

impl SystemMetrics {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let memory_used = sys.used_memory();
        let memory_total = sys.total_memory();
        let memory_usage_percent = if memory_total > 0 {
            (memory_used as f32 / memory_total as f32) * 100.0
        } else {
            0.0
        };

        SystemMetrics {
            cpu_usage_percent: sys.global_cpu_usage(),
            memory_used_bytes: memory_used,
            memory_total_bytes: memory_total,
            memory_usage_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(rename = "checkedAt")]
    pub checked_at: DateTime<Utc>,
    #[serde(rename = "activeProvider")]
    pub active_provider: String,
    pub providers: Vec<ProviderHealth>,
    pub system: SystemMetrics,
}

/// Probes every initialized backend and folds the results, together with the
/// breaker phases, into one status.
pub struct StorageHealthChecker {
    timeout: Duration,
    breakers: Arc<CircuitBreakerManager>,
}

impl StorageHealthChecker {
    pub fn new(timeout: Duration, breakers: Arc<CircuitBreakerManager>) -> Self {
        Self { timeout, breakers }
    }

    pub async fn check(&self, active_provider: &str, backends: &[ProviderCandidate]) -> HealthReport {
        let mut providers = Vec::with_capacity(backends.len());

        for candidate in backends {
            let started = Instant::now();
            let probe = tokio::time::timeout(self.timeout, candidate.backend.health_check()).await;
            let response_time_ms = started.elapsed().as_millis() as u64;

            let error = match probe {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("health check timed out after {:?}", self.timeout)),
            };
            let circuit = self.breakers.breaker(&candidate.name).phase();
            let healthy = error.is_none() && circuit != CircuitPhase::Open;

            if healthy {
                debug!("Provider '{}' is healthy ({}ms)", candidate.name, response_time_ms);
            } else {
                warn!(
                    "Provider '{}' is unhealthy: circuit={:?}, error={:?}",
                    candidate.name, circuit, error
                );
            }

            providers.push(ProviderHealth {
                name: candidate.name.clone(),
                provider_type: candidate.backend.provider_type(),
                active: candidate.name == active_provider,
                healthy,
                circuit,
                response_time_ms,
                error,
            });
        }

        HealthReport {
            status: aggregate(active_provider, &providers),
            checked_at: Utc::now(),
            active_provider: active_provider.to_string(),
            providers,
            system: SystemMetrics::collect(),
        }
    }
}

/// Active provider down (or missing) is unhealthy; any other provider down is
/// degraded.
fn aggregate(active_provider: &str, providers: &[ProviderHealth]) -> HealthStatus {
    let active_healthy = providers
        .iter()
        .any(|p| p.name == active_provider && p.healthy);
    if !active_healthy {
        HealthStatus::Unhealthy
    } else if providers.iter().any(|p| !p.healthy) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
