//! Measurement replication: dedup, then batched bulk-create.
//!
//! Copies accumulate into a batch that is flushed when full and once the
//! source is exhausted. A batch-level failure counts the whole batch as
//! errored (the bulk call is all-or-nothing) and the batch is dropped before
//! processing continues.

use metrics::counter;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::fingerprint::fingerprint;
use crate::models::DeviceSignalMigrationReport;
use crate::platform::{Measurement, SourceRef};

use super::{FingerprintMultiset, MigrateError, MigrationTask, MigratorSettings, Outcome};

/// Migrate one device's measurements, producing its report.
pub async fn migrate(
    task: &MigrationTask<'_>,
    settings: &MigratorSettings,
) -> DeviceSignalMigrationReport {
    info!(
        source_device_id = task.source_device_id,
        target_device_id = task.target_device_id,
        "migrating device measurements"
    );
    let started = Instant::now();

    match run(task, settings).await {
        Ok(outcome) => {
            info!(
                source_device_id = task.source_device_id,
                target_device_id = task.target_device_id,
                migrated = outcome.migrated,
                errors = outcome.errors,
                duplicates_skipped = outcome.duplicates_skipped,
                "done migrating measurements"
            );
            outcome.into_report(task, started.elapsed().as_secs())
        }
        Err(err) => {
            error!(
                source_device_id = task.source_device_id,
                error = %err,
                "error migrating measurements for device"
            );
            counter!("measurement_migration_device_errors_total").increment(1);
            super::fatal_report(task, &err, started.elapsed().as_secs())
        }
    }
}

async fn run(
    task: &MigrationTask<'_>,
    settings: &MigratorSettings,
) -> Result<Outcome, MigrateError> {
    let target_measurements = task
        .target
        .measurements(task.target_device_id, &task.range)
        .await?;
    let mut existing = FingerprintMultiset::default();
    for mut measurement in target_measurements {
        existing.insert(fingerprint(&mut measurement)?);
    }

    let source_measurements = task
        .source
        .measurements(task.source_device_id, &task.range)
        .await?;

    let mut outcome = Outcome::default();
    let mut batch: Vec<Measurement> = Vec::with_capacity(settings.measurement_batch_size);

    for mut measurement in source_measurements {
        let print = match fingerprint(&mut measurement) {
            Ok(print) => print,
            Err(err) => {
                warn!(error = %err, "error fingerprinting measurement");
                outcome.errors += 1;
                counter!("measurement_migration_errors_total").increment(1);
                continue;
            }
        };
        if existing.take(&print) {
            outcome.duplicates_skipped += 1;
            counter!("measurement_migration_duplicates_skipped_total").increment(1);
            continue;
        }

        measurement.source = Some(SourceRef::device(task.target_device_id));
        batch.push(measurement);
        if batch.len() >= settings.measurement_batch_size {
            flush_batch(task, &mut batch, &mut outcome).await;
        }
    }
    // Source exhausted: submit whatever accumulated.
    flush_batch(task, &mut batch, &mut outcome).await;

    Ok(outcome)
}

/// Submit the batch as one bulk-create call. The batch is consumed either
/// way: on failure every record in it counts as errored.
async fn flush_batch(task: &MigrationTask<'_>, batch: &mut Vec<Measurement>, outcome: &mut Outcome) {
    if batch.is_empty() {
        return;
    }
    match task.target.create_measurements(batch).await {
        Ok(()) => {
            outcome.migrated += batch.len() as u64;
            counter!("measurement_migration_migrated_total").increment(batch.len() as u64);
            debug!(
                source_device_id = task.source_device_id,
                target_device_id = task.target_device_id,
                migrated = outcome.migrated,
                "flushed measurement batch"
            );
        }
        Err(err) => {
            warn!(
                batch_size = batch.len(),
                error = %err,
                "bulk measurement create failed, dropping batch"
            );
            outcome.errors += batch.len() as u64;
            counter!("measurement_migration_errors_total").increment(batch.len() as u64);
        }
    }
    batch.clear();
}
