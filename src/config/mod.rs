//! Configuration loading for the signal migration service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `SIGMIG_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration derived from `SIGMIG_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Base URL of the home platform, which stores the durable job records.
    /// Connection descriptors using this host authenticate with the home
    /// credentials below instead of a login string.
    #[serde(default = "default_home_platform_url")]
    pub home_platform_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_platform_tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_platform_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_platform_password: Option<String>,

    /// Parallel device migrations per job.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Re-submit persisted EXECUTING jobs on process start.
    #[serde(default = "default_resume_jobs_on_startup")]
    pub resume_jobs_on_startup: bool,
    /// Ceiling for a replicated alarm's `count`.
    #[serde(default = "default_alarm_count_cap")]
    pub alarm_count_cap: u64,
    /// Attempts for the durable job write.
    #[serde(default = "default_persist_retry_max_attempts")]
    pub persist_retry_max_attempts: u32,
    /// Fixed wait between persistence attempts.
    #[serde(default = "default_persist_retry_wait_seconds")]
    pub persist_retry_wait_seconds: u64,
    /// Measurements accumulated per bulk-create call.
    #[serde(default = "default_measurement_batch_size")]
    pub measurement_batch_size: usize,
    /// Items requested per platform collection page.
    #[serde(default = "default_platform_page_size")]
    pub platform_page_size: usize,
    /// Safety switch: skip platform create/update calls, logging instead.
    #[serde(default)]
    pub disable_platform_writes: bool,
}

fn default_profile() -> String {
    "dev".to_string()
}

fn default_api_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_home_platform_url() -> String {
    "http://cumulocity:8111".to_string()
}

fn default_worker_pool_size() -> usize {
    9
}

fn default_resume_jobs_on_startup() -> bool {
    true
}

fn default_alarm_count_cap() -> u64 {
    99
}

fn default_persist_retry_max_attempts() -> u32 {
    4
}

fn default_persist_retry_wait_seconds() -> u64 {
    40
}

fn default_measurement_batch_size() -> usize {
    200
}

fn default_platform_page_size() -> usize {
    500
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            home_platform_url: default_home_platform_url(),
            home_platform_tenant: None,
            home_platform_user: None,
            home_platform_password: None,
            worker_pool_size: default_worker_pool_size(),
            resume_jobs_on_startup: default_resume_jobs_on_startup(),
            alarm_count_cap: default_alarm_count_cap(),
            persist_retry_max_attempts: default_persist_retry_max_attempts(),
            persist_retry_wait_seconds: default_persist_retry_wait_seconds(),
            measurement_batch_size: default_measurement_batch_size(),
            platform_page_size: default_platform_page_size(),
            disable_platform_writes: false,
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.home_platform_password.is_some() {
            config.home_platform_password = Some("[REDACTED]".to_string());
        }
        serde_json::to_string(&config)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidPositiveInteger { key: String, value: String },
}

/// Loads configuration using layered `.env` files and `SIGMIG_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration: `.env` layers first, process environment last so
    /// it wins.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut layered = BTreeMap::new();
        self.merge_dotenv(self.base_dir.join(".env"), &mut layered)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut layered)?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("SIGMIG_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let take = |layered: &mut BTreeMap<String, String>, key: &str| {
            layered.remove(key).filter(|v| !v.is_empty())
        };

        let api_bind_addr = take(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        // Fail early on an unparseable bind address rather than at serve time.
        api_bind_addr
            .parse::<SocketAddr>()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: api_bind_addr.clone(),
                source,
            })?;

        Ok(AppConfig {
            profile: take(&mut layered, "PROFILE").unwrap_or_else(default_profile),
            api_bind_addr,
            log_level: take(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level),
            log_format: take(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format),
            home_platform_url: take(&mut layered, "HOME_PLATFORM_URL")
                .unwrap_or_else(default_home_platform_url),
            home_platform_tenant: take(&mut layered, "HOME_PLATFORM_TENANT"),
            home_platform_user: take(&mut layered, "HOME_PLATFORM_USER"),
            home_platform_password: take(&mut layered, "HOME_PLATFORM_PASSWORD"),
            worker_pool_size: parse_positive(
                &mut layered,
                "WORKER_POOL_SIZE",
                default_worker_pool_size(),
            )?,
            resume_jobs_on_startup: parse_bool(
                &mut layered,
                "RESUME_JOBS_ON_STARTUP",
                default_resume_jobs_on_startup(),
            ),
            alarm_count_cap: parse_positive(
                &mut layered,
                "ALARM_COUNT_CAP",
                default_alarm_count_cap(),
            )?,
            persist_retry_max_attempts: parse_positive(
                &mut layered,
                "PERSIST_RETRY_MAX_ATTEMPTS",
                default_persist_retry_max_attempts(),
            )?,
            persist_retry_wait_seconds: layered
                .remove("PERSIST_RETRY_WAIT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_persist_retry_wait_seconds),
            measurement_batch_size: parse_positive(
                &mut layered,
                "MEASUREMENT_BATCH_SIZE",
                default_measurement_batch_size(),
            )?,
            platform_page_size: parse_positive(
                &mut layered,
                "PLATFORM_PAGE_SIZE",
                default_platform_page_size(),
            )?,
            disable_platform_writes: parse_bool(&mut layered, "DISABLE_PLATFORM_WRITES", false),
        })
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) =
                        item.map_err(|source| ConfigError::EnvFile {
                            path: path.clone(),
                            source,
                        })?;
                    if let Some(stripped) = key.strip_prefix("SIGMIG_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            // Missing layer files are fine.
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(source) => Err(ConfigError::EnvFile { path, source }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(values: &mut BTreeMap<String, String>, key: &str, default: bool) -> bool {
    values
        .remove(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn parse_positive<T>(
    values: &mut BTreeMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match values.remove(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<T>() {
            Ok(parsed) if parsed > T::default() => Ok(parsed),
            _ => Err(ConfigError::InvalidPositiveInteger {
                key: format!("SIGMIG_{key}"),
                value: raw,
            }),
        },
    }
}
