//! HTTP platform client tests against a wiremock server: pagination,
//! authentication, error mapping and the write-disable safety switch.

use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use signal_migration::platform::http::{HttpPlatform, HttpPlatformOptions};
use signal_migration::platform::{
    Alarm, AlarmStatus, DateRange, Measurement, Platform, PlatformError, SourceRef,
};

const LOGIN: &str = "t100/admin:secret";

fn platform(server: &MockServer, options: HttpPlatformOptions) -> HttpPlatform {
    HttpPlatform::new(&server.uri(), LOGIN, options).unwrap()
}

fn range() -> DateRange {
    DateRange {
        from: Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap(),
        to: Utc.with_ymd_and_hms(2021, 8, 1, 0, 0, 0).unwrap(),
    }
}

fn alarm_json(id: &str, count: u64) -> serde_json::Value {
    json!({
        "id": id,
        "source": {"id": "42"},
        "type": "c8y_SignalLost",
        "text": "signal lost",
        "status": "ACTIVE",
        "severity": "MAJOR",
        "time": "2021-07-04T05:03:23.000Z",
        "count": count
    })
}

#[tokio::test]
async fn alarms_are_fetched_across_pages() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alarm/alarms"))
        .and(query_param("source", "42"))
        .and(query_param("dateFrom", "2021-07-01T00:00:00.000Z"))
        .and(query_param("dateTo", "2021-08-01T00:00:00.000Z"))
        .and(query_param("pageSize", "2"))
        .and(query_param("currentPage", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alarms": [alarm_json("1", 1), alarm_json("2", 3)]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alarm/alarms"))
        .and(query_param("currentPage", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alarms": [alarm_json("3", 1)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let platform = platform(
        &server,
        HttpPlatformOptions {
            page_size: 2,
            disable_writes: false,
        },
    );
    let alarms = platform.alarms("42", &range()).await?;
    assert_eq!(alarms.len(), 3);
    assert_eq!(alarms[1].count, 3);
    Ok(())
}

#[tokio::test]
async fn requests_carry_basic_auth_from_login_string() -> Result<()> {
    let server = MockServer::start().await;
    let expected_auth = format!("Basic {}", BASE64.encode(LOGIN));

    Mock::given(method("GET"))
        .and(path("/inventory/managedObjects/7"))
        .and(header("Authorization", expected_auth.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "7",
            "name": "device 7"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let platform = platform(&server, HttpPlatformOptions::default());
    let mo = platform.managed_object("7").await?;
    assert_eq!(mo.id.as_deref(), Some("7"));
    Ok(())
}

#[tokio::test]
async fn missing_external_id_maps_to_not_found() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/identity/externalIds/c8y_Serial/SN-404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let platform = platform(&server, HttpPlatformOptions::default());
    let result = platform.device_by_external_id("c8y_Serial", "SN-404").await;
    assert!(matches!(result, Err(PlatformError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn server_errors_map_to_http_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/event/events"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let platform = platform(&server, HttpPlatformOptions::default());
    let result = platform.events("42", &range()).await;
    assert!(matches!(
        result,
        Err(PlatformError::Http { status: 500, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn alarm_status_update_is_status_only() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/alarm/alarms/9"))
        .and(body_json(json!({"status": "CLEARED"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(alarm_json("9", 5)))
        .expect(1)
        .mount(&server)
        .await;

    let platform = platform(&server, HttpPlatformOptions::default());
    platform.update_alarm_status("9", AlarmStatus::Cleared).await?;
    Ok(())
}

#[tokio::test]
async fn bulk_measurement_create_wraps_batch() -> Result<()> {
    let server = MockServer::start().await;
    let measurement: Measurement = serde_json::from_value(json!({
        "source": {"id": "42"},
        "type": "c8y_TemperatureMeasurement",
        "time": "2021-07-04T05:00:00Z",
        "c8y_Temperature": {"T": {"value": 20.0, "unit": "C"}}
    }))?;

    Mock::given(method("POST"))
        .and(path("/measurement/measurements"))
        .and(body_json(json!({
            "measurements": [serde_json::to_value(&measurement)?]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let platform = platform(&server, HttpPlatformOptions::default());
    platform.create_measurements(&[measurement]).await?;
    Ok(())
}

#[tokio::test]
async fn disabled_writes_never_touch_the_network() -> Result<()> {
    // No mocks mounted: any request would fail the test with a 404.
    let server = MockServer::start().await;
    let platform = platform(
        &server,
        HttpPlatformOptions {
            page_size: 500,
            disable_writes: true,
        },
    );

    let alarm = Alarm {
        id: None,
        self_url: None,
        source: Some(SourceRef::device("42")),
        alarm_type: "c8y_SignalLost".to_string(),
        text: "signal lost".to_string(),
        status: AlarmStatus::Active,
        severity: "MAJOR".to_string(),
        time: Utc.with_ymd_and_hms(2021, 7, 4, 5, 0, 0).unwrap(),
        first_occurrence_time: None,
        count: 1,
        creation_time: None,
        last_updated: None,
        history: None,
        attrs: serde_json::Map::new(),
    };

    let created = platform.create_alarm(&alarm).await?;
    assert!(created.id.is_none());
    platform.update_alarm_status("9", AlarmStatus::Cleared).await?;
    platform.create_measurements(&[]).await?;
    assert_eq!(server.received_requests().await.unwrap().len(), 0);
    Ok(())
}
