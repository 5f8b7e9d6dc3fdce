//! Device identity resolution.
//!
//! Maps a source device to its counterpart on the target tenant via the
//! external identifiers both tenants share, with optional explicit mapping
//! advice for identifiers whose value differs between tenants.

use thiserror::Error;
use tracing::{debug, info};

use crate::models::ExternalIdMappingAdvice;
use crate::platform::{Platform, PlatformError};

/// External-id types that are platform-internal and meaningless across
/// tenants; identifiers of these types never participate in resolution.
pub const IGNORED_EXTERNAL_ID_TYPES: &[&str] = &["c8y_OpcuaDevice"];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no suitable external identifiers on source device {0}")]
    NoExternalIdentifiers(String),

    #[error("unable to find target device for source device {0}")]
    NoMatchingTargetDevice(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Resolve the target-tenant device matching `source_device_id`.
///
/// Walks the source device's external identifiers in their original order,
/// applying mapping advice where the source value has an explicit override,
/// and returns the first device the target identity index knows. Lookup
/// failures for an individual identifier are non-fatal and advance to the
/// next one.
pub async fn resolve_target_device(
    source_device_id: &str,
    advice: &[ExternalIdMappingAdvice],
    source: &dyn Platform,
    target: &dyn Platform,
) -> Result<String, ResolveError> {
    let external_ids = source.external_ids_of(source_device_id).await?;
    debug!(
        source_device_id,
        count = external_ids.len(),
        "fetched external ids of source device"
    );

    let candidates: Vec<_> = external_ids
        .into_iter()
        .filter(|ext| !IGNORED_EXTERNAL_ID_TYPES.contains(&ext.id_type.as_str()))
        .collect();
    if candidates.is_empty() {
        return Err(ResolveError::NoExternalIdentifiers(
            source_device_id.to_string(),
        ));
    }

    for ext in &candidates {
        let target_value = advice
            .iter()
            .find(|a| a.source_external_id == ext.external_id)
            .map(|a| a.target_external_id.as_str())
            .unwrap_or(ext.external_id.as_str());

        match target.device_by_external_id(&ext.id_type, target_value).await {
            Ok(device) => {
                if let Some(target_device_id) = device.id {
                    info!(
                        source_device_id,
                        target_device_id,
                        id_type = %ext.id_type,
                        target_value,
                        "resolved target device by external id"
                    );
                    return Ok(target_device_id);
                }
            }
            Err(err) => {
                debug!(
                    source_device_id,
                    id_type = %ext.id_type,
                    target_value,
                    error = %err,
                    "external id lookup missed, trying next identifier"
                );
            }
        }
    }

    Err(ResolveError::NoMatchingTargetDevice(
        source_device_id.to_string(),
    ))
}
