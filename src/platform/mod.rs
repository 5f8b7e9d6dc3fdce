//! Remote platform contract
//!
//! The migration core only consumes an abstract paginated-query +
//! create/update contract from the multi-tenant IoT platform. The concrete
//! HTTP client lives in [`http`]; tests substitute an in-memory fake.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod http;
pub mod types;

pub use types::{
    Alarm, AlarmStatus, DateRange, Event, ExternalId, ManagedObject, Measurement, SourceRef,
};

use crate::models::PlatformConnection;

/// Errors surfaced by platform calls.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error talking to platform: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed platform response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid platform connection: {0}")]
    Connection(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// The paginated-query + create/update contract the migration core consumes.
///
/// All collection queries return fully drained pages; callers never see
/// pagination. Write operations respect the platform handle's
/// `disable_platform_writes` safety switch where one is configured.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Query inventory objects by an opaque filter expression.
    async fn inventory_by_query(&self, query: &str) -> PlatformResult<Vec<ManagedObject>>;

    async fn managed_object(&self, id: &str) -> PlatformResult<ManagedObject>;

    /// Create an inventory object, returning the stored copy with its id.
    async fn create_managed_object(&self, mo: &ManagedObject) -> PlatformResult<ManagedObject>;

    async fn update_managed_object(&self, mo: &ManagedObject) -> PlatformResult<ManagedObject>;

    /// All external identifiers registered for a device.
    async fn external_ids_of(&self, device_id: &str) -> PlatformResult<Vec<ExternalId>>;

    /// Look up the device owning the (type, value) pair in the identity index.
    async fn device_by_external_id(
        &self,
        id_type: &str,
        value: &str,
    ) -> PlatformResult<ManagedObject>;

    async fn alarms(&self, device_id: &str, range: &DateRange) -> PlatformResult<Vec<Alarm>>;

    /// Create an alarm, returning the stored record. When the platform holds
    /// a matching open aggregate this increments its count instead of
    /// creating a new record.
    async fn create_alarm(&self, alarm: &Alarm) -> PlatformResult<Alarm>;

    /// Status-only alarm update; other fields are not modifiable via update.
    async fn update_alarm_status(
        &self,
        alarm_id: &str,
        status: AlarmStatus,
    ) -> PlatformResult<()>;

    async fn events(&self, device_id: &str, range: &DateRange) -> PlatformResult<Vec<Event>>;

    async fn create_event(&self, event: &Event) -> PlatformResult<()>;

    async fn measurements(
        &self,
        device_id: &str,
        range: &DateRange,
    ) -> PlatformResult<Vec<Measurement>>;

    /// Bulk-create a measurement batch in one call (all-or-nothing).
    async fn create_measurements(&self, batch: &[Measurement]) -> PlatformResult<()>;
}

/// Turns a job's connection descriptor into a live platform handle.
///
/// The orchestrator depends on this seam instead of the HTTP client directly
/// so the whole engine can run against in-memory fakes in tests.
pub trait PlatformResolver: Send + Sync {
    fn resolve(&self, connection: &PlatformConnection) -> PlatformResult<Arc<dyn Platform>>;
}
