//! Signal replication strategies.
//!
//! One migrator per signal kind, all sharing the same shape: fetch the
//! target device's existing signals in range and index their fingerprints,
//! then walk the source device's signals in sequence, skipping everything
//! already present and copying the rest. Per-signal failures are counted and
//! never abort the device; a failed baseline or source fetch is device-fatal
//! and yields a single errored report.

use std::collections::HashMap;

use thiserror::Error;

use crate::models::DeviceSignalMigrationReport;
use crate::platform::{DateRange, Platform, PlatformError};

pub mod alarm;
pub mod event;
pub mod measurement;

/// Device-fatal migration failures.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("fingerprint serialization failed: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Everything one device migration needs: the resolved device pair, both
/// platform handles and the job's date range.
pub struct MigrationTask<'a> {
    pub source_device_id: &'a str,
    pub target_device_id: &'a str,
    pub source: &'a dyn Platform,
    pub target: &'a dyn Platform,
    pub range: DateRange,
}

/// Tuning knobs shared by the migrators, taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct MigratorSettings {
    /// Ceiling for a replicated alarm's `count`; bounds replay calls for
    /// pathological high-count alarms.
    pub alarm_count_cap: u64,
    /// Measurements accumulated per bulk-create call.
    pub measurement_batch_size: usize,
}

impl Default for MigratorSettings {
    fn default() -> Self {
        Self {
            alarm_count_cap: 99,
            measurement_batch_size: 200,
        }
    }
}

/// Occurrence-counting fingerprint index over the target device's existing
/// signals. A signal present N times contributes N; each source-side match
/// consumes one occurrence, so if the source genuinely holds more identical
/// copies than the target, exactly the excess gets copied.
#[derive(Debug, Default)]
pub struct FingerprintMultiset {
    counts: HashMap<String, u64>,
}

impl FingerprintMultiset {
    pub fn insert(&mut self, fingerprint: String) {
        *self.counts.entry(fingerprint).or_insert(0) += 1;
    }

    /// Consume one occurrence of `fingerprint` if any remain.
    pub fn take(&mut self, fingerprint: &str) -> bool {
        match self.counts.get_mut(fingerprint) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.values().all(|&c| c == 0)
    }
}

/// Counters accumulated while replicating one device's signals.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Outcome {
    pub migrated: u64,
    pub errors: u64,
    pub duplicates_skipped: u64,
}

impl Outcome {
    pub(crate) fn into_report(
        self,
        task: &MigrationTask<'_>,
        duration_sec: u64,
    ) -> DeviceSignalMigrationReport {
        DeviceSignalMigrationReport {
            source_device_id: task.source_device_id.to_string(),
            target_device_id: Some(task.target_device_id.to_string()),
            migrated: self.migrated,
            errors: self.errors,
            duplicates_skipped: self.duplicates_skipped,
            error: None,
            duration_sec,
        }
    }
}

pub(crate) fn fatal_report(
    task: &MigrationTask<'_>,
    err: &MigrateError,
    duration_sec: u64,
) -> DeviceSignalMigrationReport {
    DeviceSignalMigrationReport::fatal(
        task.source_device_id,
        Some(task.target_device_id.to_string()),
        err.to_string(),
        duration_sec,
    )
}
