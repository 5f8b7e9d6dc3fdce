//! # API Handlers
//!
//! HTTP handlers for the migration job endpoints.

use axum::response::Json;

use crate::models::ServiceInfo;

pub mod jobs;

/// Root endpoint returning basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    )
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}
