//! # Data Models
//!
//! Data models used throughout the signal migration service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod job;
pub mod job_config;

pub use job::{
    DeviceSignalMigrationReport, JOB_SCHEMA_VERSION, JobStateError, JobStatus, MigrationJob,
};
pub use job_config::{
    ExternalIdMappingAdvice, MigrationJobConfig, PlatformConnection, SignalType,
};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "signal-migration".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
