//! Config fingerprinting and advisory-lock key derivation (§4.1).
//!
//! The fingerprint gates whether a schema migration needs to run at all; the
//! advisory lock key serializes concurrent deploys against the same schema.

use sha1::{Digest, Sha1};

/// Bump whenever the shape the materializer emits changes in a way that requires a
/// forced re-migration even if the declarative document is byte-identical.
pub const INTERNAL_SCHEMA_VERSION: u32 = 1;

/// SHA-1 of the internal schema version prefixed onto the raw document bytes,
/// hex-encoded. Stored in `_registry_` under `"config_fingerprint"`; a migration is
/// skipped when the stored value already matches.
pub fn fingerprint(document: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(INTERNAL_SCHEMA_VERSION.to_be_bytes());
    hasher.update(document.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive a stable `bigint` advisory lock key from the SQL schema name, so that two
/// processes migrating the same schema serialize against each other while distinct
/// schemas (e.g. in multi-tenant-by-schema deployments) don't contend.
pub fn advisory_lock_key(schema_name: &str) -> i64 {
    let mut hasher = Sha1::new();
    hasher.update(b"kurbisio-schema-lock:");
    hasher.update(schema_name.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    i64::from_be_bytes(bytes)
}
