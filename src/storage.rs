//! Companion external storage (§4.6.1): the object-store boundary a blob resource's
//! presigned-URL handling and prefix deletion are built against.
//!
//! No single corpus file covers an object-storage boundary; grounded on the
//! teacher's `kernel/traits.rs` convention for an infrastructure capability trait
//! (`Base*` name, `async_trait`, `Send + Sync`, `anyhow::Result` at the seam) and
//! generalized to the two operations §4.6.1 names.

use async_trait::async_trait;
use std::time::Duration;

/// The only two capabilities a companion blob needs from its external store: minting
/// a time-limited presigned URL for `GET`/`PUT`, and cleaning up every object under a
/// resource's key prefix once the row (and all its children) are gone.
#[async_trait]
pub trait BaseCompanionStorage: Send + Sync {
    /// Mint a presigned URL valid for `ttl` that a client can use directly, without
    /// routing the (potentially large) body through this service.
    async fn get_presigned_url(
        &self,
        operation: PresignedOperation,
        key: &str,
        ttl: Duration,
    ) -> anyhow::Result<String>;

    /// Delete every object whose key starts with `prefix`. Used when a resource (and
    /// everything nested under it) is deleted or cleared.
    async fn delete_all_with_prefix(&self, prefix: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignedOperation {
    Get,
    Put,
}

/// Deterministic key derivation (§4.6.1): `<schema>/<resource-path>/<parent-ids-in-
/// order>/<entity-id>`, so a resource's storage key can always be recomputed from its
/// row without a side table, and a parent's prefix always covers its descendants.
pub fn companion_key(schema_name: &str, resource_path: &str, parent_chain: &[String]) -> String {
    let mut parts = vec![schema_name.to_string(), resource_path.to_string()];
    parts.extend(parent_chain.iter().cloned());
    parts.join("/")
}
