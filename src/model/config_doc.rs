//! Declarative configuration shapes (§3.1). Parsed straight from the document's
//! JSON via `serde`; validated against the embedded meta-schema before use.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
    Clear,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct ParseOperationError(String);

impl Operation {
    /// Stored verbatim in `_job_.type` for notification jobs, so the worker pool
    /// can recover which operation to dispatch without a JSON round-trip.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::List => "list",
            Operation::Clear => "clear",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "list" => Ok(Operation::List),
            "clear" => Ok(Operation::Clear),
            other => Err(ParseOperationError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Permit {
    pub role: String,
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub selectors: Vec<String>,
}

/// The shared declarative shape for collections, singletons, and blobs. Singletons
/// are collections with cardinality 1 per parent; blobs are collections whose body
/// is a byte payload. Both are materialized as a tagged [`ResourceKind`] rather than
/// a distinct struct, since the shape of the configuration is identical.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Collection {
    /// Slash path; the last segment is the entity name, preceding segments are the
    /// parent chain.
    pub resource: String,
    #[serde(default)]
    pub schema_id: Option<String>,
    #[serde(default)]
    pub static_properties: Vec<String>,
    #[serde(default)]
    pub searchable_properties: Vec<String>,
    #[serde(default)]
    pub external_index: Option<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub with_log: bool,
    #[serde(default)]
    pub with_companion_file: bool,
    #[serde(default)]
    pub companion_presigned_url_validity: Option<u64>,
    #[serde(default)]
    pub permits: Vec<Permit>,
}

/// A blob shares the collection configuration shape; the `blob BYTEA` column and
/// header-based metadata mapping are handler/materializer behavior, not configuration.
pub type Blob = Collection;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Relation {
    pub left: String,
    pub right: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub left_permits: Vec<Permit>,
    #[serde(default)]
    pub right_permits: Vec<Permit>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Shortcut {
    pub shortcut: String,
    pub target: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Configuration {
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub singletons: Vec<Collection>,
    #[serde(default)]
    pub blobs: Vec<Blob>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub shortcuts: Vec<Shortcut>,
}

/// What kind of resource a declarative entry describes; carried alongside the
/// shared [`Collection`] shape once the configuration has been flattened and
/// depth-ordered (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Collection,
    Singleton,
    Blob,
}

impl Configuration {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_configuration() {
        let doc = r#"{
            "collections": [{"resource": "users", "external_index": "identity"}],
            "singletons": [{"resource": "users/profile"}],
            "blobs": [{"resource": "users/picture", "with_companion_file": true}],
            "relations": [{"left": "users", "right": "devices"}],
            "shortcuts": [{"shortcut": "me", "target": "users/{user_id}", "roles": ["user"]}]
        }"#;
        let cfg = Configuration::from_json(doc).unwrap();
        assert_eq!(cfg.collections.len(), 1);
        assert_eq!(cfg.singletons.len(), 1);
        assert_eq!(cfg.blobs.len(), 1);
        assert_eq!(cfg.relations.len(), 1);
        assert_eq!(cfg.shortcuts.len(), 1);
        assert_eq!(cfg.collections[0].external_index.as_deref(), Some("identity"));
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let cfg = Configuration::from_json("{}").unwrap();
        assert!(cfg.collections.is_empty());
        assert!(cfg.relations.is_empty());
    }

    #[test]
    fn operation_round_trips_through_str() {
        use std::str::FromStr;
        for op in [
            Operation::Create,
            Operation::Read,
            Operation::Update,
            Operation::Delete,
            Operation::List,
            Operation::Clear,
        ] {
            assert_eq!(Operation::from_str(op.as_str()).unwrap(), op);
        }
        assert!(Operation::from_str("frobnicate").is_err());
    }
}
