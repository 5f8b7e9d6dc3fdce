//! Alarm replication.
//!
//! Alarms are the hard case: the platform aggregates repeated
//! ACTIVE/ACKNOWLEDGED alarms of identical (source, type) into one record
//! with an incrementing `count`, and the update API only accepts text,
//! status, severity and custom properties, so `count` and
//! `firstOccurrenceTime` cannot be written directly. Replication therefore
//! replays the aggregate: create the first occurrence as ACTIVE, re-post the
//! identical body until the counter matches, then fix up the final status.
//!
//! Known limitation: the target derives a CLEARED alarm's "was active for"
//! duration from the replica's own creation instant, which cannot be
//! backdated, so that duration will generally differ from the source.

use metrics::counter;
use std::time::Instant;
use tracing::{error, info, trace, warn};

use crate::fingerprint::fingerprint;
use crate::models::DeviceSignalMigrationReport;
use crate::platform::{Alarm, AlarmStatus, SourceRef};

use super::{FingerprintMultiset, MigrateError, MigrationTask, MigratorSettings, Outcome};

/// Migrate one device's alarms, producing its report.
pub async fn migrate(
    task: &MigrationTask<'_>,
    settings: &MigratorSettings,
) -> DeviceSignalMigrationReport {
    info!(
        source_device_id = task.source_device_id,
        target_device_id = task.target_device_id,
        "migrating device alarms"
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
                "done migrating alarms"
            );
            outcome.into_report(task, started.elapsed().as_secs())
        }
        Err(err) => {
            error!(
                source_device_id = task.source_device_id,
                error = %err,
                "error migrating alarms for device"
            );
            counter!("alarm_migration_device_errors_total").increment(1);
            super::fatal_report(task, &err, started.elapsed().as_secs())
        }
    }
}

async fn run(
    task: &MigrationTask<'_>,
    settings: &MigratorSettings,
) -> Result<Outcome, MigrateError> {
    let target_alarms = task.target.alarms(task.target_device_id, &task.range).await?;
    let mut existing = FingerprintMultiset::default();
    for mut alarm in target_alarms {
        existing.insert(fingerprint(&mut alarm)?);
    }

    let mut source_alarms = task.source.alarms(task.source_device_id, &task.range).await?;
    // CLEARED must replicate before open alarms of the same type, or its
    // replay would bump the live aggregate's count.
    source_alarms.sort_by_key(|a| a.status.replay_rank());

    let mut outcome = Outcome::default();
    for mut alarm in source_alarms {
        let source_alarm_id = alarm.id.clone();
        match replicate_alarm(&mut alarm, task, settings, &mut existing).await {
            Ok(Replication::Skipped) => {
                outcome.duplicates_skipped += 1;
                counter!("alarm_migration_duplicates_skipped_total").increment(1);
            }
            Ok(Replication::Copied) => {
                outcome.migrated += 1;
                counter!("alarm_migration_migrated_total").increment(1);
                trace!(
                    source_device_id = task.source_device_id,
                    source_alarm_id = source_alarm_id.as_deref().unwrap_or("?"),
                    migrated = outcome.migrated,
                    "migrated alarm"
                );
            }
            Err(err) => {
                warn!(
                    source_alarm_id = source_alarm_id.as_deref().unwrap_or("?"),
                    error = %err,
                    "error migrating alarm"
                );
                outcome.errors += 1;
                counter!("alarm_migration_errors_total").increment(1);
            }
        }
    }
    Ok(outcome)
}

enum Replication {
    Skipped,
    Copied,
}

async fn replicate_alarm(
    alarm: &mut Alarm,
    task: &MigrationTask<'_>,
    settings: &MigratorSettings,
    existing: &mut FingerprintMultiset,
) -> Result<Replication, MigrateError> {
    // Clamp before fingerprinting so a re-run matches the capped copy that
    // actually landed on the target.
    if alarm.count > settings.alarm_count_cap {
        alarm.count = settings.alarm_count_cap;
    }

    let print = fingerprint(alarm)?;
    if existing.take(&print) {
        return Ok(Replication::Skipped);
    }

    let mut copy = Alarm {
        id: None,
        self_url: None,
        source: Some(SourceRef::device(task.target_device_id)),
        alarm_type: alarm.alarm_type.clone(),
        text: alarm.text.clone(),
        status: alarm.status,
        severity: alarm.severity.clone(),
        time: alarm.time,
        first_occurrence_time: None,
        count: 1,
        creation_time: None,
        last_updated: None,
        history: None,
        attrs: alarm.attrs.clone(),
    };

    if alarm.count == 1 {
        // One-time alarm: a single create with the original status and time.
        task.target.create_alarm(&copy).await?;
        return Ok(Replication::Copied);
    }

    // Multi-count alarm: create the first occurrence as ACTIVE so the
    // target's own aggregation engine engages on the re-posts.
    copy.time = alarm.first_occurrence_time.unwrap_or(alarm.time);
    copy.status = AlarmStatus::Active;
    let created = task.target.create_alarm(&copy).await?;

    // Advance the aggregate counter; the individual occurrence times are not
    // tracked by the platform, so all re-posts carry the latest time.
    copy.time = alarm.time;
    for _ in 1..alarm.count {
        task.target.create_alarm(&copy).await?;
    }

    if alarm.status != AlarmStatus::Active {
        match created.id {
            Some(created_id) => {
                task.target
                    .update_alarm_status(&created_id, alarm.status)
                    .await?;
            }
            None => {
                // Writes disabled: nothing was created, so there is no
                // record to move out of ACTIVE.
                trace!("created alarm has no id, skipping final status update");
            }
        }
    }

    Ok(Replication::Copied)
}
