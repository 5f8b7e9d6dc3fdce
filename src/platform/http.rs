//! HTTP platform client
//!
//! Concrete [`Platform`] implementation over the platform's REST API:
//! basic-auth from a `tenant/user:password` login string, drained page loops
//! for collection queries, and a `disable_platform_writes` safety switch
//! that turns every create/update into a log line.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::PlatformConnection;

use super::types::{Alarm, AlarmStatus, DateRange, Event, ExternalId, ManagedObject, Measurement};
use super::{Platform, PlatformError, PlatformResolver, PlatformResult};

/// Options shared by every [`HttpPlatform`] a resolver hands out.
#[derive(Debug, Clone)]
pub struct HttpPlatformOptions {
    /// Items requested per collection page.
    pub page_size: usize,
    /// Skip create/update calls and log instead.
    pub disable_writes: bool,
}

impl Default for HttpPlatformOptions {
    fn default() -> Self {
        Self {
            page_size: 500,
            disable_writes: false,
        }
    }
}

/// One authenticated platform connection.
pub struct HttpPlatform {
    client: reqwest::Client,
    base_url: Url,
    auth_header: String,
    options: HttpPlatformOptions,
}

impl HttpPlatform {
    /// Build a handle for `host` authenticating as `login`
    /// (`tenant/user:password`).
    pub fn new(host: &str, login: &str, options: HttpPlatformOptions) -> PlatformResult<Self> {
        let base_url = Url::parse(host)
            .map_err(|err| PlatformError::Connection(format!("invalid platform host: {err}")))?;
        if !login.contains(':') {
            return Err(PlatformError::Connection(
                "login string must have the form tenant/user:password".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            auth_header: format!("Basic {}", BASE64.encode(login)),
            options,
        })
    }

    fn endpoint(&self, path: &str) -> PlatformResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| PlatformError::Connection(format!("invalid endpoint path: {err}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> PlatformResult<T> {
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        body: &impl serde::Serialize,
    ) -> PlatformResult<T> {
        let response = request
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> PlatformResult<T> {
        let status = response.status();
        let body = response.text().await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(body));
        }
        if !status.is_success() {
            return Err(PlatformError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Drain every page of a collection resource. The platform embeds the
    /// items under `collection_field`; a page shorter than the requested
    /// page size terminates the loop.
    async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        collection_field: &str,
    ) -> PlatformResult<Vec<T>> {
        let mut items = Vec::new();
        let mut current_page = 1usize;
        loop {
            let mut url = self.endpoint(path)?;
            {
                let mut query = url.query_pairs_mut();
                for (key, value) in params {
                    query.append_pair(key, value);
                }
                query.append_pair("pageSize", &self.options.page_size.to_string());
                query.append_pair("currentPage", &current_page.to_string());
            }
            let page: serde_json::Value = self.get_json(url).await?;
            let page_items = page
                .get(collection_field)
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let page_len = page_items.len();
            for item in page_items {
                items.push(serde_json::from_value(item)?);
            }
            debug!(path, current_page, page_len, "fetched platform page");
            if page_len < self.options.page_size {
                return Ok(items);
            }
            current_page += 1;
        }
    }

    fn range_params(device_id: &str, range: &DateRange) -> Vec<(&'static str, String)> {
        vec![
            ("source", device_id.to_string()),
            (
                "dateFrom",
                range.from.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            (
                "dateTo",
                range.to.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ]
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn inventory_by_query(&self, query: &str) -> PlatformResult<Vec<ManagedObject>> {
        self.fetch_all_pages(
            "/inventory/managedObjects",
            &[("query", query.to_string())],
            "managedObjects",
        )
        .await
    }

    async fn managed_object(&self, id: &str) -> PlatformResult<ManagedObject> {
        let url = self.endpoint(&format!("/inventory/managedObjects/{id}"))?;
        self.get_json(url).await
    }

    async fn create_managed_object(&self, mo: &ManagedObject) -> PlatformResult<ManagedObject> {
        if self.options.disable_writes {
            info!("skipping create_managed_object: platform writes are disabled");
            let mut copy = mo.clone();
            copy.id = Some(format!("dry-run-{}", Uuid::new_v4()));
            return Ok(copy);
        }
        let url = self.endpoint("/inventory/managedObjects")?;
        self.send_json(self.client.post(url), mo).await
    }

    async fn update_managed_object(&self, mo: &ManagedObject) -> PlatformResult<ManagedObject> {
        if self.options.disable_writes {
            info!("skipping update_managed_object: platform writes are disabled");
            return Ok(mo.clone());
        }
        let id = mo
            .id
            .as_deref()
            .ok_or_else(|| PlatformError::Connection("update requires an object id".into()))?;
        let url = self.endpoint(&format!("/inventory/managedObjects/{id}"))?;
        self.send_json(self.client.put(url), mo).await
    }

    async fn external_ids_of(&self, device_id: &str) -> PlatformResult<Vec<ExternalId>> {
        self.fetch_all_pages(
            &format!("/identity/globalIds/{device_id}/externalIds"),
            &[],
            "externalIds",
        )
        .await
    }

    async fn device_by_external_id(
        &self,
        id_type: &str,
        value: &str,
    ) -> PlatformResult<ManagedObject> {
        let url = self.endpoint(&format!("/identity/externalIds/{id_type}/{value}"))?;
        let external_id: ExternalId = self.get_json(url).await?;
        match external_id.managed_object {
            Some(owner) => Ok(ManagedObject {
                id: Some(owner.id),
                self_url: owner.self_url,
                ..ManagedObject::default()
            }),
            None => Err(PlatformError::NotFound(format!(
                "external id {id_type}/{value} has no owning device"
            ))),
        }
    }

    async fn alarms(&self, device_id: &str, range: &DateRange) -> PlatformResult<Vec<Alarm>> {
        self.fetch_all_pages("/alarm/alarms", &Self::range_params(device_id, range), "alarms")
            .await
    }

    async fn create_alarm(&self, alarm: &Alarm) -> PlatformResult<Alarm> {
        if self.options.disable_writes {
            info!("skipping create_alarm: platform writes are disabled");
            return Ok(alarm.clone());
        }
        let url = self.endpoint("/alarm/alarms")?;
        self.send_json(self.client.post(url), alarm).await
    }

    async fn update_alarm_status(
        &self,
        alarm_id: &str,
        status: AlarmStatus,
    ) -> PlatformResult<()> {
        if self.options.disable_writes {
            info!("skipping update_alarm_status: platform writes are disabled");
            return Ok(());
        }
        let url = self.endpoint(&format!("/alarm/alarms/{alarm_id}"))?;
        let body = serde_json::json!({ "status": status });
        let _: serde_json::Value = self.send_json(self.client.put(url), &body).await?;
        Ok(())
    }

    async fn events(&self, device_id: &str, range: &DateRange) -> PlatformResult<Vec<Event>> {
        self.fetch_all_pages("/event/events", &Self::range_params(device_id, range), "events")
            .await
    }

    async fn create_event(&self, event: &Event) -> PlatformResult<()> {
        if self.options.disable_writes {
            info!("skipping create_event: platform writes are disabled");
            return Ok(());
        }
        let url = self.endpoint("/event/events")?;
        let _: serde_json::Value = self.send_json(self.client.post(url), event).await?;
        Ok(())
    }

    async fn measurements(
        &self,
        device_id: &str,
        range: &DateRange,
    ) -> PlatformResult<Vec<Measurement>> {
        self.fetch_all_pages(
            "/measurement/measurements",
            &Self::range_params(device_id, range),
            "measurements",
        )
        .await
    }

    async fn create_measurements(&self, batch: &[Measurement]) -> PlatformResult<()> {
        if self.options.disable_writes {
            info!(
                batch_size = batch.len(),
                "skipping create_measurements: platform writes are disabled"
            );
            return Ok(());
        }
        let url = self.endpoint("/measurement/measurements")?;
        let body = serde_json::json!({ "measurements": batch });
        let _: serde_json::Value = self.send_json(self.client.post(url), &body).await?;
        Ok(())
    }
}

/// Resolves job connection descriptors into [`HttpPlatform`] handles.
///
/// A descriptor whose host matches the configured home platform URL must
/// omit its login string and authenticates with the home credentials from
/// configuration instead.
pub struct HttpPlatformResolver {
    home_url: String,
    home_login: Option<String>,
    options: HttpPlatformOptions,
}

impl HttpPlatformResolver {
    pub fn from_config(config: &AppConfig) -> Self {
        let home_login = match (
            &config.home_platform_tenant,
            &config.home_platform_user,
            &config.home_platform_password,
        ) {
            (Some(tenant), Some(user), Some(password)) => {
                Some(format!("{tenant}/{user}:{password}"))
            }
            _ => None,
        };
        Self {
            home_url: config.home_platform_url.clone(),
            home_login,
            options: HttpPlatformOptions {
                page_size: config.platform_page_size,
                disable_writes: config.disable_platform_writes,
            },
        }
    }

    /// Handle for the home platform itself (job persistence, resume scan).
    pub fn home_platform(&self) -> PlatformResult<Arc<dyn Platform>> {
        self.resolve(&PlatformConnection {
            host: self.home_url.clone(),
            login: None,
        })
    }
}

impl PlatformResolver for HttpPlatformResolver {
    fn resolve(&self, connection: &PlatformConnection) -> PlatformResult<Arc<dyn Platform>> {
        let login = if connection.host == self.home_url {
            if connection.login.as_deref().is_some_and(|l| !l.is_empty()) {
                return Err(PlatformError::Connection(
                    "login must be empty when the host is the home platform".to_string(),
                ));
            }
            self.home_login.clone().ok_or_else(|| {
                PlatformError::Connection(
                    "home platform credentials are not configured".to_string(),
                )
            })?
        } else {
            connection
                .login
                .clone()
                .filter(|l| !l.is_empty())
                .ok_or_else(|| {
                    PlatformError::Connection(format!(
                        "login string required for platform {}",
                        connection.host
                    ))
                })?
        };
        Ok(Arc::new(HttpPlatform::new(
            &connection.host,
            &login,
            self.options.clone(),
        )?))
    }
}
