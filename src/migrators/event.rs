//! Event replication: dedup, then one-for-one copy re-pointed at the target
//! device. Per-event failures are counted and the device continues.

use metrics::counter;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::fingerprint::fingerprint;
use crate::models::DeviceSignalMigrationReport;
use crate::platform::{Event, SourceRef};

use super::{FingerprintMultiset, MigrateError, MigrationTask, MigratorSettings, Outcome};

/// Migrate one device's events, producing its report.
pub async fn migrate(
    task: &MigrationTask<'_>,
    _settings: &MigratorSettings,
) -> DeviceSignalMigrationReport {
    info!(
        source_device_id = task.source_device_id,
        target_device_id = task.target_device_id,
        "migrating device events"
    );
    let started = Instant::now();

    match run(task).await {
        Ok(outcome) => {
            info!(
                source_device_id = task.source_device_id,
                target_device_id = task.target_device_id,
                migrated = outcome.migrated,
                errors = outcome.errors,
                duplicates_skipped = outcome.duplicates_skipped,
                "done migrating events"
            );
            outcome.into_report(task, started.elapsed().as_secs())
        }
        Err(err) => {
            error!(
                source_device_id = task.source_device_id,
                error = %err,
                "error migrating events for device"
            );
            counter!("event_migration_device_errors_total").increment(1);
            super::fatal_report(task, &err, started.elapsed().as_secs())
        }
    }
}

async fn run(task: &MigrationTask<'_>) -> Result<Outcome, MigrateError> {
    let target_events = task.target.events(task.target_device_id, &task.range).await?;
    let mut existing = FingerprintMultiset::default();
    for mut event in target_events {
        existing.insert(fingerprint(&mut event)?);
    }

    let source_events = task.source.events(task.source_device_id, &task.range).await?;

    let mut outcome = Outcome::default();
    for mut event in source_events {
        match replicate_event(&mut event, task, &mut existing).await {
            Ok(true) => {
                outcome.migrated += 1;
                counter!("event_migration_migrated_total").increment(1);
            }
            Ok(false) => {
                outcome.duplicates_skipped += 1;
                counter!("event_migration_duplicates_skipped_total").increment(1);
            }
            Err(err) => {
                warn!(error = %err, "error migrating event");
                outcome.errors += 1;
                counter!("event_migration_errors_total").increment(1);
            }
        }
    }
    Ok(outcome)
}

async fn replicate_event(
    event: &mut Event,
    task: &MigrationTask<'_>,
    existing: &mut FingerprintMultiset,
) -> Result<bool, MigrateError> {
    let print = fingerprint(event)?;
    if existing.take(&print) {
        return Ok(false);
    }
    event.source = Some(SourceRef::device(task.target_device_id));
    task.target.create_event(event).await?;
    Ok(true)
}
