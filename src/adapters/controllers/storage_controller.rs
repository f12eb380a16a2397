use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

use crate::{
    adapters::state::AppState,
    application::{
        error::StorageError,
        services::{
            cloud_uuid_storage_service::{MaintenanceReport, StorageMetricsReport},
            health_checker::{HealthReport, HealthStatus},
            usage_reporter::UsageReport,
        },
    },
};

pub struct StorageController;

impl StorageController {
    /// Provider probes, breaker phases and process metrics
    /// GET /api/v1/health
    pub async fn health_check(
        State(app_state): State<AppState>,
    ) -> Result<(StatusCode, Json<HealthReport>), StorageError> {
        info!("Health check requested");

        let report = app_state.storage_service.health().await?;
        let status = match report.status {
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        };
        Ok((status, Json(report)))
    }

    /// GET /api/v1/storage/metrics
    pub async fn get_metrics(State(app_state): State<AppState>) -> Json<StorageMetricsReport> {
        Json(app_state.storage_service.metrics())
    }

    /// GET /api/v1/storage/usage
    pub async fn get_usage(
        State(app_state): State<AppState>,
    ) -> Result<Json<UsageReport>, StorageError> {
        Ok(Json(app_state.storage_service.usage().await?))
    }

    /// Runs retention and orphan cleanup immediately
    /// POST /api/v1/storage/cleanup
    pub async fn run_cleanup(
        State(app_state): State<AppState>,
    ) -> Result<Json<MaintenanceReport>, StorageError> {
        info!("Manual storage cleanup requested");
        Ok(Json(app_state.storage_service.run_cleanup().await?))
    }
}
