//! Tenant-independent signal fingerprints.
//!
//! A fingerprint identifies "the same signal" across tenants: it covers the
//! signal's content (time, type, text, custom attributes, ...) but none of
//! the fields the platform stamps per tenant/instance (self link, id, source
//! device reference, creation and last-update timestamps; alarm history).
//! Migrators use fingerprints to skip signals that already exist on the
//! target, which is what makes a crashed or re-run job safe.
//!
//! The hash is a content hash, not a cryptographic identity: two distinct
//! signals colliding is theoretically possible and accepted. The canonical
//! form is the `serde_json` serialization, whose object maps keep keys
//! sorted, so attribute insertion order does not affect the fingerprint.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::platform::types::{Alarm, Event, Measurement};

/// A signal record whose tenant/instance-specific fields can be cleared.
pub trait Fingerprintable: Serialize {
    /// Clear tenant-specific fields in place. Idempotent.
    fn strip_tenant_fields(&mut self);
}

impl Fingerprintable for Measurement {
    fn strip_tenant_fields(&mut self) {
        self.self_url = None;
        self.id = None;
        self.source = None;
    }
}

impl Fingerprintable for Event {
    fn strip_tenant_fields(&mut self) {
        self.self_url = None;
        self.id = None;
        self.source = None;
        self.creation_time = None;
        self.last_updated = None;
    }
}

impl Fingerprintable for Alarm {
    fn strip_tenant_fields(&mut self) {
        self.self_url = None;
        self.id = None;
        self.source = None;
        self.creation_time = None;
        self.last_updated = None;
        self.history = None;
    }
}

/// Strip tenant-specific fields from the record and hash what remains.
///
/// NOTE: mutates the record in place; callers that still need the original
/// id or source reference must take them before fingerprinting.
pub fn fingerprint<T: Fingerprintable>(signal: &mut T) -> Result<String, serde_json::Error> {
    signal.strip_tenant_fields();
    let canonical = serde_json::to_string(signal)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}
