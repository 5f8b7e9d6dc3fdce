//! Immutable migration job configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::platform::types::DateRange;

/// Which signal kind a job migrates; selects the matching migrator and the
/// platform sub-resource it talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Measurement,
    Event,
    Alarm,
}

/// Connection descriptor for one side of a migration.
///
/// `login` carries `tenant/user:password`. An absent login selects the home
/// platform credentials from configuration, which is only valid when `host`
/// is the configured home platform URL.
#[derive(Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConnection {
    /// Base URL of the platform, e.g. `https://tenant.example.com`.
    pub host: String,
    /// `tenant/user:password` login string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
}

// Credentials stay out of logs.
impl std::fmt::Debug for PlatformConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConnection")
            .field("host", &self.host)
            .field("login", &self.login.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Explicit override telling the resolver that a source external identifier
/// value maps to a different value on the target tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdMappingAdvice {
    pub source_external_id: String,
    pub target_external_id: String,
}

/// Immutable input describing one migration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationJobConfig {
    pub job_name: String,
    pub signal_type: SignalType,
    pub source_platform: PlatformConnection,
    pub target_platform: PlatformConnection,
    /// Opaque device filter expression passed through to the platform,
    /// e.g. `$filter=(has('foo') and has('c8y_IsDevice'))`.
    pub source_devices_query: String,
    /// Inclusive lower bound of the signal date range.
    pub date_from: DateTime<Utc>,
    /// Exclusive upper bound of the signal date range.
    pub date_to: DateTime<Utc>,
    /// Optional explicit external-id overrides; not required.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_id_mapping_advice: Vec<ExternalIdMappingAdvice>,
}

impl MigrationJobConfig {
    /// The signal date range `[date_from, date_to)`.
    pub fn date_range(&self) -> DateRange {
        DateRange {
            from: self.date_from,
            to: self.date_to,
        }
    }
}
