//! Job Orchestrator
//!
//! Owns the migration job lifecycle: start, resume-on-restart,
//! retry-on-demand, status transitions and durable persistence with bounded
//! retry. All job mutation funnels through `handle_device_report`, which
//! holds the job's lock across the append / recompute / persist triple so
//! concurrently completing devices cannot race the status transition.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::migrators::MigratorSettings;
use crate::models::{DeviceSignalMigrationReport, JobStatus, MigrationJob, MigrationJobConfig};
use crate::platform::{Platform, PlatformError, PlatformResolver};
use crate::repositories::{JobRepository, JobRepositoryError};

use super::coordinator;

/// Job-level failures surfaced to the caller that triggered the job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Repository(#[from] JobRepositoryError),

    #[error("job {record_id} is not completed (status {status}); pass force to retry anyway")]
    NotTerminal { record_id: String, status: String },

    #[error("job {0} has no device migration errors, will not retry")]
    NothingToRetry(String),
}

/// Orchestrator tuning, taken from [`AppConfig`] in production and built
/// directly in tests.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Parallel device migrations per job.
    pub worker_pool_size: usize,
    /// Attempts for the durable job write.
    pub persist_retry_max_attempts: u32,
    /// Fixed wait between persistence attempts.
    pub persist_retry_wait: Duration,
    pub migrators: MigratorSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: 9,
            persist_retry_max_attempts: 4,
            persist_retry_wait: Duration::from_secs(40),
            migrators: MigratorSettings::default(),
        }
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            worker_pool_size: config.worker_pool_size,
            persist_retry_max_attempts: config.persist_retry_max_attempts,
            persist_retry_wait: Duration::from_secs(config.persist_retry_wait_seconds),
            migrators: MigratorSettings {
                alarm_count_cap: config.alarm_count_cap,
                measurement_batch_size: config.measurement_batch_size,
            },
        }
    }
}

/// A job that has been enumerated and persisted as EXECUTING, ready for the
/// coordinator to fan out.
pub struct PreparedJob {
    pub(crate) job: Arc<Mutex<MigrationJob>>,
    pub(crate) config: MigrationJobConfig,
    pub(crate) pending_devices: Vec<String>,
    pub(crate) source: Arc<dyn Platform>,
    pub(crate) target: Arc<dyn Platform>,
    record_id: String,
}

impl PreparedJob {
    /// Identifier of the persisted job record.
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Devices still to be migrated in this run.
    pub fn pending_device_count(&self) -> usize {
        self.pending_devices.len()
    }
}

/// Owns job lifecycle and report bookkeeping.
pub struct JobOrchestrator {
    repo: JobRepository,
    platforms: Arc<dyn PlatformResolver>,
    settings: OrchestratorSettings,
}

impl JobOrchestrator {
    pub fn new(
        repo: JobRepository,
        platforms: Arc<dyn PlatformResolver>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            repo,
            platforms,
            settings,
        }
    }

    pub(crate) fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Start a job asynchronously: enumerate and persist it, then hand the
    /// per-device work to a background task. Returns the persisted record
    /// id. Failures in this phase are job-fatal and propagate; the job is
    /// never left EXECUTING without its devices dispatched.
    pub async fn submit(self: &Arc<Self>, job: MigrationJob) -> Result<String, JobError> {
        let prepared = self.prepare(job).await?;
        let record_id = prepared.record_id.clone();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute(prepared).await;
        });
        Ok(record_id)
    }

    /// Enumerate source devices, stamp totals, and persist the job as
    /// EXECUTING. Devices that already carry a report (resumed or retried
    /// jobs) are excluded from the pending set.
    pub async fn prepare(&self, mut job: MigrationJob) -> Result<PreparedJob, JobError> {
        info!(job_name = %job.config.job_name, "starting migration job");

        let source = self.platforms.resolve(&job.config.source_platform)?;
        let target = self.platforms.resolve(&job.config.target_platform)?;

        let devices = source
            .inventory_by_query(&job.config.source_devices_query)
            .await?;
        let device_ids: Vec<String> = devices.into_iter().filter_map(|mo| mo.id).collect();
        info!(
            job_name = %job.config.job_name,
            count = device_ids.len(),
            "source devices found"
        );

        job.num_total_devices = Some(device_ids.len() as u64);
        job.status = JobStatus::Executing;
        let record_id = self.save_with_retry(&mut job).await?;

        let (pending, already_processed): (Vec<String>, Vec<String>) = device_ids
            .into_iter()
            .partition(|id| !job.is_device_processed(id));
        if !already_processed.is_empty() {
            info!(
                job_name = %job.config.job_name,
                skipped = already_processed.len(),
                "devices already processed, skipping"
            );
        }

        // Nothing left to dispatch: transition right away (covers both an
        // empty device selection and a resume that crashed after the final
        // report landed).
        if pending.is_empty() {
            match job.update_status() {
                Ok(()) => {
                    if job.status != JobStatus::Executing {
                        self.save_with_retry(&mut job).await?;
                    }
                }
                Err(err) => {
                    error!(record_id, error = %err, "internal consistency fault preparing job");
                }
            }
        }

        let config = job.config.clone();
        Ok(PreparedJob {
            job: Arc::new(Mutex::new(job)),
            config,
            pending_devices: pending,
            source,
            target,
            record_id,
        })
    }

    /// Run the per-device migrations for a prepared job to completion.
    pub async fn execute(self: &Arc<Self>, prepared: PreparedJob) {
        coordinator::dispatch(Arc::clone(self), prepared).await;
    }

    /// Re-submit all persisted jobs still EXECUTING (crash recovery).
    pub async fn resume_incomplete_jobs(self: &Arc<Self>) {
        let jobs = match self.repo.find_incomplete().await {
            Ok(jobs) => jobs,
            Err(err) => {
                error!(error = %err, "failed to scan for incomplete jobs");
                return;
            }
        };
        info!(count = jobs.len(), "resuming incomplete migration jobs");
        for job in jobs {
            let record_id = job.record_id.clone().unwrap_or_default();
            info!(record_id, job_name = %job.config.job_name, "resuming job");
            if let Err(err) = self.submit(job).await {
                error!(record_id, error = %err, "error resuming job");
            }
        }
    }

    /// Re-run the errored devices of a persisted job.
    ///
    /// Preconditions: the job must be terminal unless `force` is set, and
    /// must hold at least one errored device report.
    pub async fn retry_job(self: &Arc<Self>, record_id: &str, force: bool) -> Result<String, JobError> {
        let mut job = self.repo.load(record_id).await?;

        if !job.status.is_terminal() && !force {
            return Err(JobError::NotTerminal {
                record_id: record_id.to_string(),
                status: job.status.as_str().to_string(),
            });
        }
        let removed = job.remove_reports_with_errors();
        if removed == 0 {
            return Err(JobError::NothingToRetry(record_id.to_string()));
        }
        info!(
            record_id,
            removed, "retrying job, devices with errors removed"
        );
        self.submit(job).await
    }

    pub async fn load_job(&self, record_id: &str) -> Result<MigrationJob, JobError> {
        Ok(self.repo.load(record_id).await?)
    }

    /// Record one device's report: append, recompute status and persist as
    /// one unit under the job lock. Persistence failure is logged and swallowed;
    /// re-raising here would make the caller synthesize a duplicate error
    /// report for the device.
    pub(crate) async fn handle_device_report(
        &self,
        shared: &Arc<Mutex<MigrationJob>>,
        report: DeviceSignalMigrationReport,
    ) {
        let mut job = shared.lock().await;
        info!(
            source_device_id = %report.source_device_id,
            errored = report.is_errored(),
            "recording device report"
        );
        job.add_device_report(report);
        if let Err(err) = job.update_status() {
            error!(
                error = %err,
                "internal consistency fault in job bookkeeping, report not persisted"
            );
            return;
        }
        if let Err(err) = self.save_with_retry(&mut job).await {
            error!(error = %err, "giving up persisting job after device report");
        }
    }

    /// Durable write with the fixed-attempt/fixed-wait retry policy.
    async fn save_with_retry(&self, job: &mut MigrationJob) -> Result<String, JobRepositoryError> {
        let max_attempts = self.settings.persist_retry_max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.repo.save(job).await {
                Ok(record_id) => return Ok(record_id),
                Err(err) if attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %err,
                        "persisting migration job failed, will retry"
                    );
                    sleep(self.settings.persist_retry_wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
