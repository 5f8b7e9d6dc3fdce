//! # Migration Job Handlers
//!
//! Thin REST surface over the job orchestrator: create, retry and inspect
//! migration jobs. The create call is synchronous up to the point the job is
//! persisted as EXECUTING; the per-device work runs in the background.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{
    DeviceSignalMigrationReport, JobStatus, MigrationJob, MigrationJobConfig, SignalType,
};
use crate::server::AppState;

/// Response for job creation and retry.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobCreatedResponse {
    /// Identifier of the persisted job record
    #[schema(example = "104001")]
    pub id: String,
}

/// Query parameters for the retry endpoint
#[derive(Debug, Deserialize)]
pub struct RetryParams {
    /// Retry even if the job is not terminal
    #[serde(default)]
    pub force: bool,
}

/// Job state response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Identifier of the persisted job record
    pub id: String,
    pub job_name: String,
    pub signal_type: SignalType,
    pub status: JobStatus,
    pub num_total_devices: Option<u64>,
    pub num_completed_devices: u64,
    pub device_reports: Vec<DeviceSignalMigrationReport>,
}

impl From<MigrationJob> for JobInfo {
    fn from(job: MigrationJob) -> Self {
        Self {
            id: job.record_id.unwrap_or_default(),
            job_name: job.config.job_name,
            signal_type: job.config.signal_type,
            status: job.status,
            num_total_devices: job.num_total_devices,
            num_completed_devices: job.num_completed_devices,
            device_reports: job.device_reports,
        }
    }
}

/// Create and start a migration job.
#[utoipa::path(
    post,
    path = "/migrationjob",
    request_body = MigrationJobConfig,
    responses(
        (status = 201, description = "Job created and started", body = JobCreatedResponse),
        (status = 400, description = "Invalid job configuration", body = ApiError),
        (status = 502, description = "Platform call failed", body = ApiError)
    )
)]
pub async fn create_migration_job(
    State(state): State<AppState>,
    Json(config): Json<MigrationJobConfig>,
) -> Result<(StatusCode, Json<JobCreatedResponse>), ApiError> {
    info!(job_name = %config.job_name, "POST /migrationjob");
    let job = MigrationJob::new(config);
    let id = state.orchestrator.submit(job).await?;
    Ok((StatusCode::CREATED, Json(JobCreatedResponse { id })))
}

/// Re-run the errored devices of a terminal job.
#[utoipa::path(
    post,
    path = "/migrationjob/{id}/retry",
    params(
        ("id" = String, Path, description = "Job record identifier"),
        ("force" = Option<bool>, Query, description = "Retry even if the job is not terminal")
    ),
    responses(
        (status = 201, description = "Retry started", body = JobCreatedResponse),
        (status = 400, description = "No errored device reports", body = ApiError),
        (status = 404, description = "Job not found", body = ApiError),
        (status = 409, description = "Job not completed and force not set", body = ApiError)
    )
)]
pub async fn retry_migration_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<RetryParams>,
) -> Result<(StatusCode, Json<JobCreatedResponse>), ApiError> {
    info!(record_id = %id, force = params.force, "POST /migrationjob/retry");
    let id = state.orchestrator.retry_job(&id, params.force).await?;
    Ok((StatusCode::CREATED, Json(JobCreatedResponse { id })))
}

/// Fetch the current state of a migration job.
#[utoipa::path(
    get,
    path = "/migrationjob/{id}",
    params(
        ("id" = String, Path, description = "Job record identifier")
    ),
    responses(
        (status = 200, description = "Job state", body = JobInfo),
        (status = 404, description = "Job not found", body = ApiError)
    )
)]
pub async fn get_migration_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobInfo>, ApiError> {
    let job = state.orchestrator.load_job(&id).await?;
    Ok(Json(job.into()))
}
