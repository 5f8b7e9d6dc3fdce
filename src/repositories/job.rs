//! Durable migration job records.
//!
//! A job lives as a tagged fragment on a generic inventory object of the
//! home platform, so job state survives restarts and is queryable with the
//! platform's own filter language (by status, by name).

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::models::{JOB_SCHEMA_VERSION, JobStatus, MigrationJob};
use crate::platform::{ManagedObject, Platform, PlatformError};

/// Fragment name tagging the inventory objects that back migration jobs.
pub const JOB_FRAGMENT: &str = "signalMigrationJob";

#[derive(Debug, Error)]
pub enum JobRepositoryError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("job fragment (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("inventory object {0} does not carry a migration job fragment")]
    NotAJob(String),

    #[error("platform did not return an id for the created job record")]
    MissingRecordId,
}

/// Persists and loads [`MigrationJob`] records on the home platform.
pub struct JobRepository {
    home: Arc<dyn Platform>,
}

impl JobRepository {
    pub fn new(home: Arc<dyn Platform>) -> Self {
        Self { home }
    }

    /// Create or update the job's backing record. Sets `record_id` on first
    /// save and returns it.
    pub async fn save(&self, job: &mut MigrationJob) -> Result<String, JobRepositoryError> {
        let mut mo = ManagedObject::default();
        mo.attrs
            .insert(JOB_FRAGMENT.to_string(), serde_json::to_value(&*job)?);

        match job.record_id.clone() {
            None => {
                info!(job_name = %job.config.job_name, "creating job record");
                let created = self.home.create_managed_object(&mo).await?;
                let record_id = created.id.ok_or(JobRepositoryError::MissingRecordId)?;
                job.record_id = Some(record_id.clone());
                Ok(record_id)
            }
            Some(record_id) => {
                info!(job_name = %job.config.job_name, record_id, "updating job record");
                mo.id = Some(record_id.clone());
                self.home.update_managed_object(&mo).await?;
                Ok(record_id)
            }
        }
    }

    pub async fn load(&self, record_id: &str) -> Result<MigrationJob, JobRepositoryError> {
        let mo = self.home.managed_object(record_id).await?;
        Self::job_from_object(mo)
    }

    /// All persisted jobs of the current schema version still EXECUTING;
    /// the startup resume scan re-submits these.
    pub async fn find_incomplete(&self) -> Result<Vec<MigrationJob>, JobRepositoryError> {
        let query = format!(
            "has('{JOB_FRAGMENT}') and {JOB_FRAGMENT}.version eq {JOB_SCHEMA_VERSION} \
             and {JOB_FRAGMENT}.status eq '{}'",
            JobStatus::Executing.as_str()
        );
        self.find_by_query(&query).await
    }

    /// Jobs matching a given name, regardless of status.
    pub async fn find_by_name(&self, job_name: &str) -> Result<Vec<MigrationJob>, JobRepositoryError> {
        let query = format!(
            "has('{JOB_FRAGMENT}') and {JOB_FRAGMENT}.config.jobName eq '{job_name}'"
        );
        self.find_by_query(&query).await
    }

    async fn find_by_query(&self, query: &str) -> Result<Vec<MigrationJob>, JobRepositoryError> {
        let objects = self.home.inventory_by_query(query).await?;
        objects.into_iter().map(Self::job_from_object).collect()
    }

    fn job_from_object(mo: ManagedObject) -> Result<MigrationJob, JobRepositoryError> {
        let fragment: &Value = mo
            .attrs
            .get(JOB_FRAGMENT)
            .ok_or_else(|| JobRepositoryError::NotAJob(mo.id.clone().unwrap_or_default()))?;
        let mut job: MigrationJob = serde_json::from_value(fragment.clone())?;
        job.record_id = mo.id;
        Ok(job)
    }
}
