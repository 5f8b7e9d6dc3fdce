//! Wire representations of the remote platform's records.
//!
//! These mirror the platform's JSON shapes closely enough to round-trip:
//! known fields are typed, everything else rides along in the flattened
//! `attrs` map. `serde_json`'s default map keeps keys sorted, which the
//! fingerprint engine relies on for a canonical serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference to the record's owning device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_url: Option<String>,
}

impl SourceRef {
    pub fn device(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            self_url: None,
        }
    }
}

/// Half-open date range `[from, to)` scoping a signal query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Alarm lifecycle status as the platform reports it.
///
/// The replay order is explicit rather than derived from the lexical value:
/// CLEARED alarms must be replicated before open ones so that re-posting a
/// cleared alarm cannot bump the live aggregate of an open alarm of the same
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmStatus {
    Active,
    Acknowledged,
    Cleared,
}

impl AlarmStatus {
    /// Sort key for replication: CLEARED first, then ACKNOWLEDGED, then ACTIVE.
    pub fn replay_rank(self) -> u8 {
        match self {
            AlarmStatus::Cleared => 0,
            AlarmStatus::Acknowledged => 1,
            AlarmStatus::Active => 2,
        }
    }
}

fn default_alarm_count() -> u64 {
    1
}

/// An alarm record. Repeated ACTIVE/ACKNOWLEDGED alarms of identical
/// (source, type) are aggregated server-side into one record with an
/// incrementing `count`; CLEARED alarms are never aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    #[serde(rename = "type")]
    pub alarm_type: String,
    pub text: String,
    pub status: AlarmStatus,
    pub severity: String,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_occurrence_time: Option<DateTime<Utc>>,
    #[serde(default = "default_alarm_count")]
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Value>,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

/// An event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub text: String,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

/// A measurement record. The actual series values live in `attrs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    #[serde(rename = "type")]
    pub measurement_type: String,
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

/// A generic inventory object: devices, and the durable record a migration
/// job is persisted on (as a tagged fragment inside `attrs`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

/// An external identifier registered for a device in the identity index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalId {
    pub external_id: String,
    #[serde(rename = "type")]
    pub id_type: String,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_object: Option<SourceRef>,
}
