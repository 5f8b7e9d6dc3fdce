//! Shared test fixtures: an in-memory platform fake implementing the full
//! [`Platform`] contract, including the server-side alarm aggregation the
//! alarm migrator replays against, plus a resolver wiring mock hosts to
//! mock platforms.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use signal_migration::jobs::{JobOrchestrator, OrchestratorSettings};
use signal_migration::models::{MigrationJobConfig, PlatformConnection, SignalType};
use signal_migration::platform::{
    Alarm, AlarmStatus, DateRange, Event, ExternalId, ManagedObject, Measurement, Platform,
    PlatformError, PlatformResolver, PlatformResult, SourceRef,
};
use signal_migration::repositories::{JOB_FRAGMENT, JobRepository};

pub const SOURCE_HOST: &str = "https://source.example.com";
pub const TARGET_HOST: &str = "https://target.example.com";
pub const HOME_HOST: &str = "http://cumulocity:8111";
pub const DEVICE_QUERY: &str = "$filter=(has('c8y_IsDevice'))";

/// Per-operation call counters, for API-call-count assertions.
#[derive(Debug, Default, Clone)]
pub struct CallCounts {
    pub create_alarm: u64,
    pub update_alarm_status: u64,
    pub create_event: u64,
    pub create_measurements: u64,
    pub managed_object_writes: u64,
}

#[derive(Default)]
pub struct MockState {
    pub devices_by_query: HashMap<String, Vec<String>>,
    pub external_ids: HashMap<String, Vec<ExternalId>>,
    /// (type, value) -> owning device id
    pub identity_index: HashMap<(String, String), String>,
    pub alarms: Vec<Alarm>,
    pub events: Vec<Event>,
    pub measurements: Vec<Measurement>,
    pub objects: HashMap<String, ManagedObject>,
    pub calls: CallCounts,
    /// Fail the next N managed-object writes with HTTP 500.
    pub failing_object_writes: u32,
    /// Fail the next N bulk measurement creates with HTTP 500.
    pub failing_measurement_creates: u32,
    next_id: u64,
}

impl MockState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

/// In-memory platform fake.
#[derive(Default)]
pub struct MockPlatform {
    pub state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn alarms_of(&self, device_id: &str) -> Vec<Alarm> {
        self.state
            .lock()
            .unwrap()
            .alarms
            .iter()
            .filter(|a| a.source.as_ref().is_some_and(|s| s.id == device_id))
            .cloned()
            .collect()
    }

    pub fn events_of(&self, device_id: &str) -> Vec<Event> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.source.as_ref().is_some_and(|s| s.id == device_id))
            .cloned()
            .collect()
    }

    pub fn measurements_of(&self, device_id: &str) -> Vec<Measurement> {
        self.state
            .lock()
            .unwrap()
            .measurements
            .iter()
            .filter(|m| m.source.as_ref().is_some_and(|s| s.id == device_id))
            .cloned()
            .collect()
    }
}

fn in_range(time: &DateTime<Utc>, range: &DateRange) -> bool {
    *time >= range.from && *time < range.to
}

#[async_trait]
impl Platform for MockPlatform {
    async fn inventory_by_query(&self, query: &str) -> PlatformResult<Vec<ManagedObject>> {
        let state = self.state.lock().unwrap();
        if query.contains(JOB_FRAGMENT) {
            let wanted_status = query
                .split("status eq '")
                .nth(1)
                .and_then(|rest| rest.split('\'').next());
            let wanted_name = query
                .split("config.jobName eq '")
                .nth(1)
                .and_then(|rest| rest.split('\'').next());
            let jobs = state
                .objects
                .values()
                .filter(|mo| {
                    mo.attrs.get(JOB_FRAGMENT).is_some_and(|frag| {
                        wanted_status.is_none_or(|status| frag["status"] == status)
                            && wanted_name
                                .is_none_or(|name| frag["config"]["jobName"] == name)
                    })
                })
                .cloned()
                .collect();
            return Ok(jobs);
        }
        let device_ids = state.devices_by_query.get(query).cloned().unwrap_or_default();
        Ok(device_ids
            .into_iter()
            .map(|id| ManagedObject {
                id: Some(id),
                ..ManagedObject::default()
            })
            .collect())
    }

    async fn managed_object(&self, id: &str) -> PlatformResult<ManagedObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(id.to_string()))
    }

    async fn create_managed_object(&self, mo: &ManagedObject) -> PlatformResult<ManagedObject> {
        let mut state = self.state.lock().unwrap();
        state.calls.managed_object_writes += 1;
        if state.failing_object_writes > 0 {
            state.failing_object_writes -= 1;
            return Err(PlatformError::Http {
                status: 500,
                body: "injected write failure".to_string(),
            });
        }
        let mut stored = mo.clone();
        let id = state.next_id();
        stored.id = Some(id.clone());
        state.objects.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_managed_object(&self, mo: &ManagedObject) -> PlatformResult<ManagedObject> {
        let mut state = self.state.lock().unwrap();
        state.calls.managed_object_writes += 1;
        if state.failing_object_writes > 0 {
            state.failing_object_writes -= 1;
            return Err(PlatformError::Http {
                status: 500,
                body: "injected write failure".to_string(),
            });
        }
        let id = mo
            .id
            .clone()
            .ok_or_else(|| PlatformError::Connection("update requires an id".into()))?;
        if !state.objects.contains_key(&id) {
            return Err(PlatformError::NotFound(id));
        }
        state.objects.insert(id, mo.clone());
        Ok(mo.clone())
    }

    async fn external_ids_of(&self, device_id: &str) -> PlatformResult<Vec<ExternalId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .external_ids
            .get(device_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn device_by_external_id(
        &self,
        id_type: &str,
        value: &str,
    ) -> PlatformResult<ManagedObject> {
        let state = self.state.lock().unwrap();
        match state
            .identity_index
            .get(&(id_type.to_string(), value.to_string()))
        {
            Some(device_id) => Ok(ManagedObject {
                id: Some(device_id.clone()),
                ..ManagedObject::default()
            }),
            None => Err(PlatformError::NotFound(format!("{id_type}/{value}"))),
        }
    }

    async fn alarms(&self, device_id: &str, range: &DateRange) -> PlatformResult<Vec<Alarm>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .alarms
            .iter()
            .filter(|a| {
                a.source.as_ref().is_some_and(|s| s.id == device_id) && in_range(&a.time, range)
            })
            .cloned()
            .collect())
    }

    /// Emulates the platform's aggregation: a posted non-CLEARED alarm
    /// matching an open (ACTIVE/ACKNOWLEDGED) alarm of the same
    /// (source, type) bumps that record's count instead of creating a new
    /// one. Posted `count` is ignored; fresh records start at 1.
    async fn create_alarm(&self, alarm: &Alarm) -> PlatformResult<Alarm> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_alarm += 1;

        let source_id = alarm
            .source
            .as_ref()
            .ok_or_else(|| PlatformError::Connection("alarm without source".into()))?
            .id
            .clone();

        if alarm.status != AlarmStatus::Cleared {
            let time = alarm.time;
            if let Some(open) = state.alarms.iter_mut().find(|a| {
                a.source.as_ref().is_some_and(|s| s.id == source_id)
                    && a.alarm_type == alarm.alarm_type
                    && matches!(a.status, AlarmStatus::Active | AlarmStatus::Acknowledged)
            }) {
                open.count += 1;
                open.time = time;
                return Ok(open.clone());
            }
        }

        let mut stored = alarm.clone();
        let id = state.next_id();
        stored.id = Some(id);
        stored.count = 1;
        stored.first_occurrence_time = Some(alarm.time);
        stored.creation_time = Some(alarm.time);
        state.alarms.push(stored.clone());
        Ok(stored)
    }

    async fn update_alarm_status(
        &self,
        alarm_id: &str,
        status: AlarmStatus,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.update_alarm_status += 1;
        match state
            .alarms
            .iter_mut()
            .find(|a| a.id.as_deref() == Some(alarm_id))
        {
            Some(alarm) => {
                alarm.status = status;
                Ok(())
            }
            None => Err(PlatformError::NotFound(alarm_id.to_string())),
        }
    }

    async fn events(&self, device_id: &str, range: &DateRange) -> PlatformResult<Vec<Event>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| {
                e.source.as_ref().is_some_and(|s| s.id == device_id) && in_range(&e.time, range)
            })
            .cloned()
            .collect())
    }

    async fn create_event(&self, event: &Event) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_event += 1;
        let mut stored = event.clone();
        let id = state.next_id();
        stored.id = Some(id);
        state.events.push(stored);
        Ok(())
    }

    async fn measurements(
        &self,
        device_id: &str,
        range: &DateRange,
    ) -> PlatformResult<Vec<Measurement>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .measurements
            .iter()
            .filter(|m| {
                m.source.as_ref().is_some_and(|s| s.id == device_id) && in_range(&m.time, range)
            })
            .cloned()
            .collect())
    }

    async fn create_measurements(&self, batch: &[Measurement]) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_measurements += 1;
        if state.failing_measurement_creates > 0 {
            state.failing_measurement_creates -= 1;
            return Err(PlatformError::Http {
                status: 500,
                body: "injected bulk create failure".to_string(),
            });
        }
        for measurement in batch {
            let mut stored = measurement.clone();
            let id = state.next_id();
            stored.id = Some(id);
            state.measurements.push(stored);
        }
        Ok(())
    }
}

/// Maps descriptor hosts to mock platforms.
pub struct MockResolver {
    platforms: HashMap<String, Arc<MockPlatform>>,
}

impl PlatformResolver for MockResolver {
    fn resolve(&self, connection: &PlatformConnection) -> PlatformResult<Arc<dyn Platform>> {
        self.platforms
            .get(&connection.host)
            .map(|p| Arc::clone(p) as Arc<dyn Platform>)
            .ok_or_else(|| PlatformError::Connection(format!("unknown host {}", connection.host)))
    }
}

/// Everything an engine test needs: the three mock platforms and an
/// orchestrator wired to them with test-friendly settings (no retry wait).
pub struct TestRig {
    pub home: Arc<MockPlatform>,
    pub source: Arc<MockPlatform>,
    pub target: Arc<MockPlatform>,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl TestRig {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: OrchestratorSettings) -> Self {
        let home = MockPlatform::new();
        let source = MockPlatform::new();
        let target = MockPlatform::new();

        let mut platforms = HashMap::new();
        platforms.insert(SOURCE_HOST.to_string(), Arc::clone(&source));
        platforms.insert(TARGET_HOST.to_string(), Arc::clone(&target));
        platforms.insert(HOME_HOST.to_string(), Arc::clone(&home));

        let orchestrator = Arc::new(JobOrchestrator::new(
            JobRepository::new(Arc::clone(&home) as Arc<dyn Platform>),
            Arc::new(MockResolver { platforms }),
            settings,
        ));

        Self {
            home,
            source,
            target,
            orchestrator,
        }
    }

    /// Repository over the same home platform, for direct record inspection.
    pub fn repository(&self) -> JobRepository {
        JobRepository::new(Arc::clone(&self.home) as Arc<dyn Platform>)
    }

    /// Register a source device matched by [`DEVICE_QUERY`], its external id
    /// and the corresponding device on the target's identity index.
    pub fn add_device_pair(&self, source_id: &str, target_id: &str, serial: &str) {
        {
            let mut state = self.source.state.lock().unwrap();
            state
                .devices_by_query
                .entry(DEVICE_QUERY.to_string())
                .or_default()
                .push(source_id.to_string());
            state.external_ids.insert(
                source_id.to_string(),
                vec![ExternalId {
                    external_id: serial.to_string(),
                    id_type: "c8y_Serial".to_string(),
                    self_url: None,
                    managed_object: None,
                }],
            );
        }
        self.target.state.lock().unwrap().identity_index.insert(
            ("c8y_Serial".to_string(), serial.to_string()),
            target_id.to_string(),
        );
    }

    /// Register a source device that matches the query but has no usable
    /// external identifiers (resolution will fail).
    pub fn add_unresolvable_device(&self, source_id: &str) {
        self.source
            .state
            .lock()
            .unwrap()
            .devices_by_query
            .entry(DEVICE_QUERY.to_string())
            .or_default()
            .push(source_id.to_string());
    }
}

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        persist_retry_wait: Duration::ZERO,
        ..OrchestratorSettings::default()
    }
}

pub fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 7, 4, hour, minute, 0).unwrap()
}

pub fn job_config(signal_type: SignalType) -> MigrationJobConfig {
    serde_json::from_value(serde_json::json!({
        "jobName": "test-job",
        "signalType": match signal_type {
            SignalType::Measurement => "MEASUREMENT",
            SignalType::Event => "EVENT",
            SignalType::Alarm => "ALARM",
        },
        "sourcePlatform": {"host": SOURCE_HOST, "login": "t1/u:p"},
        "targetPlatform": {"host": TARGET_HOST, "login": "t2/u:p"},
        "sourceDevicesQuery": DEVICE_QUERY,
        "dateFrom": "2021-07-01T00:00:00Z",
        "dateTo": "2021-08-01T00:00:00Z"
    }))
    .unwrap()
}

pub fn measurement(device_id: &str, time: DateTime<Utc>, value: f64) -> Measurement {
    serde_json::from_value(serde_json::json!({
        "source": {"id": device_id},
        "type": "c8y_TemperatureMeasurement",
        "time": time.to_rfc3339(),
        "c8y_Temperature": {"T": {"value": value, "unit": "C"}}
    }))
    .unwrap()
}

pub fn event(device_id: &str, time: DateTime<Utc>, text: &str) -> Event {
    serde_json::from_value(serde_json::json!({
        "source": {"id": device_id},
        "type": "c8y_LocationUpdate",
        "text": text,
        "time": time.to_rfc3339()
    }))
    .unwrap()
}

pub fn alarm(
    device_id: &str,
    alarm_type: &str,
    status: AlarmStatus,
    count: u64,
    first_occurrence: DateTime<Utc>,
    time: DateTime<Utc>,
) -> Alarm {
    Alarm {
        id: Some("seed".to_string()),
        self_url: None,
        source: Some(SourceRef::device(device_id)),
        alarm_type: alarm_type.to_string(),
        text: format!("{alarm_type} raised"),
        status,
        severity: "MAJOR".to_string(),
        time,
        first_occurrence_time: Some(first_occurrence),
        count,
        creation_time: Some(first_occurrence),
        last_updated: None,
        history: None,
        attrs: serde_json::Map::new(),
    }
}
