//! Durable migration job record and per-device reports.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::job_config::MigrationJobConfig;

/// Schema version of the persisted job fragment. Bump when the layout
/// changes; the resume scan only picks up records of the current version.
pub const JOB_SCHEMA_VERSION: u32 = 2;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Executing,
    Successful,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Successful | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Executing => "EXECUTING",
            JobStatus::Successful => "SUCCESSFUL",
            JobStatus::Failed => "FAILED",
        }
    }
}

/// Per-device outcome record, appended exactly once per device per run.
///
/// A set `error` means the counts were never computed; otherwise the counts
/// describe what the migrator did for this device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSignalMigrationReport {
    pub source_device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device_id: Option<String>,
    pub migrated: u64,
    pub errors: u64,
    pub duplicates_skipped: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_sec: u64,
}

impl DeviceSignalMigrationReport {
    /// Report for a device whose migration failed before any counting.
    pub fn fatal(
        source_device_id: impl Into<String>,
        target_device_id: Option<String>,
        error: impl Into<String>,
        duration_sec: u64,
    ) -> Self {
        Self {
            source_device_id: source_device_id.into(),
            target_device_id,
            error: Some(error.into()),
            duration_sec,
            ..Self::default()
        }
    }

    /// A report counts as errored when it carries a fatal error or any
    /// signal-level error.
    pub fn is_errored(&self) -> bool {
        self.error.is_some() || self.errors > 0
    }
}

/// Internal-consistency faults in job bookkeeping. These indicate a dispatch
/// bug, not a recoverable runtime condition.
#[derive(Debug, Error)]
pub enum JobStateError {
    #[error("job holds {reports} device reports but only {total} devices were dispatched")]
    ReportOverflow { reports: usize, total: u64 },
}

/// Durable record tracking one migration request's configuration, progress
/// and terminal outcome.
///
/// Mutation happens exclusively through `add_device_report` /
/// `update_status`, serialized by the orchestrator under one lock per job
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationJob {
    pub config: MigrationJobConfig,
    /// Total devices selected by the device query; set once at dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_total_devices: Option<u64>,
    pub num_completed_devices: u64,
    pub status: JobStatus,
    /// Identifier of the inventory object this job is persisted on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub version: u32,
    #[serde(default)]
    pub device_reports: Vec<DeviceSignalMigrationReport>,
}

impl MigrationJob {
    pub fn new(config: MigrationJobConfig) -> Self {
        Self {
            config,
            num_total_devices: None,
            num_completed_devices: 0,
            status: JobStatus::Pending,
            record_id: None,
            version: JOB_SCHEMA_VERSION,
            device_reports: Vec::new(),
        }
    }

    /// Append a device report. The caller holds the job lock.
    pub fn add_device_report(&mut self, report: DeviceSignalMigrationReport) {
        self.device_reports.push(report);
    }

    /// Whether a device already produced a report in this job; used as the
    /// idempotency guard when a resumed or retried job is re-dispatched.
    pub fn is_device_processed(&self, source_device_id: &str) -> bool {
        self.device_reports
            .iter()
            .any(|r| r.source_device_id == source_device_id)
    }

    /// Drop all errored reports so their devices re-run on retry. Returns
    /// how many were removed.
    pub fn remove_reports_with_errors(&mut self) -> usize {
        let before = self.device_reports.len();
        self.device_reports.retain(|r| !r.is_errored());
        self.num_completed_devices = self.device_reports.len() as u64;
        before - self.device_reports.len()
    }

    pub fn has_errored_reports(&self) -> bool {
        self.device_reports.iter().any(|r| r.is_errored())
    }

    /// Recompute the completion count and, once all devices reported,
    /// transition to the terminal status.
    ///
    /// More reports than dispatched devices is a dispatch bug and surfaces
    /// as [`JobStateError::ReportOverflow`].
    pub fn update_status(&mut self) -> Result<(), JobStateError> {
        if self.status != JobStatus::Executing {
            return Ok(());
        }
        let total = self.num_total_devices.unwrap_or(0);
        if self.device_reports.len() as u64 > total {
            return Err(JobStateError::ReportOverflow {
                reports: self.device_reports.len(),
                total,
            });
        }
        self.num_completed_devices = self.device_reports.len() as u64;
        if self.num_completed_devices == total {
            self.status = if self.has_errored_reports() {
                JobStatus::Failed
            } else {
                JobStatus::Successful
            };
        }
        Ok(())
    }
}
