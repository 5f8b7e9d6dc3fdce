//! Device Migration Coordinator
//!
//! Bounded worker pool dispatching one migration task per pending source
//! device and funnelling every outcome back through the orchestrator's
//! report handler. A single device's failure (including a panicked worker)
//! never aborts sibling tasks and always leaves exactly one report behind.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::migrators::{self, MigrationTask, MigratorSettings};
use crate::models::{DeviceSignalMigrationReport, MigrationJobConfig, SignalType};
use crate::platform::Platform;
use crate::resolver;

use super::orchestrator::{JobOrchestrator, PreparedJob};

/// Fan out one worker per pending device, bounded by the configured pool
/// width, and wait for all of them.
pub(crate) async fn dispatch(orchestrator: Arc<JobOrchestrator>, prepared: PreparedJob) {
    let PreparedJob {
        job,
        config,
        pending_devices,
        source,
        target,
        ..
    } = prepared;

    if pending_devices.is_empty() {
        return;
    }

    let width = orchestrator.settings().worker_pool_size.max(1);
    let settings = orchestrator.settings().migrators;
    let semaphore = Arc::new(Semaphore::new(width));
    let config = Arc::new(config);

    let mut handles = Vec::with_capacity(pending_devices.len());
    for device_id in pending_devices {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!(device_id, "worker pool semaphore closed, device not dispatched");
                continue;
            }
        };
        let orchestrator = Arc::clone(&orchestrator);
        let job = Arc::clone(&job);
        let config = Arc::clone(&config);
        let source = Arc::clone(&source);
        let target = Arc::clone(&target);
        let task_device_id = device_id.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let report = migrate_device(
                &task_device_id,
                &config,
                source.as_ref(),
                target.as_ref(),
                &settings,
            )
            .await;
            orchestrator.handle_device_report(&job, report).await;
        });
        handles.push((device_id, handle));
    }

    for (device_id, handle) in handles {
        if let Err(join_err) = handle.await {
            // A worker that died without reporting still owes the job
            // exactly one report for its device.
            error!(device_id, error = %join_err, "device migration task aborted");
            let report = DeviceSignalMigrationReport::fatal(
                &device_id,
                None,
                format!("device migration task aborted: {join_err}"),
                0,
            );
            orchestrator.handle_device_report(&job, report).await;
        }
    }
}

/// Resolve the target device, then run the migrator matching the job's
/// signal type. Resolution failure yields an error-only report.
async fn migrate_device(
    source_device_id: &str,
    config: &MigrationJobConfig,
    source: &dyn Platform,
    target: &dyn Platform,
    settings: &MigratorSettings,
) -> DeviceSignalMigrationReport {
    info!(source_device_id, "migrating device signals");
    let started = Instant::now();

    let target_device_id = match resolver::resolve_target_device(
        source_device_id,
        &config.external_id_mapping_advice,
        source,
        target,
    )
    .await
    {
        Ok(id) => id,
        Err(err) => {
            warn!(source_device_id, error = %err, "target device resolution failed");
            return DeviceSignalMigrationReport::fatal(
                source_device_id,
                None,
                err.to_string(),
                started.elapsed().as_secs(),
            );
        }
    };

    let task = MigrationTask {
        source_device_id,
        target_device_id: &target_device_id,
        source,
        target,
        range: config.date_range(),
    };
    match config.signal_type {
        SignalType::Measurement => migrators::measurement::migrate(&task, settings).await,
        SignalType::Event => migrators::event::migrate(&task, settings).await,
        SignalType::Alarm => migrators::alarm::migrate(&task, settings).await,
    }
}
