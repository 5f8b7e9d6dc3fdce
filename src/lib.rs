//! # Signal Migration Library
//!
//! Core functionality for migrating device signals (measurements, events,
//! alarms) between tenants of a remote IoT platform: the job orchestrator,
//! the per-device dispatcher, the identity resolver, the fingerprint dedup
//! scheme and the three signal migrators, plus the thin REST surface.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod handlers;
pub mod jobs;
pub mod migrators;
pub mod models;
pub mod platform;
pub mod repositories;
pub mod resolver;
pub mod server;
pub mod telemetry;
