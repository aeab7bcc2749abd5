//! The embedded meta-schema that the declarative configuration document is
//! validated against before it is parsed into [`super::config_doc::Configuration`].
//!
//! The JSON Schema validator itself is an external collaborator (§1); we only model
//! the contract: "compile this schema once, validate a document against it, and
//! surface unknown keys as a [`crate::error::KurbisioError::Config`]".

use crate::error::KurbisioError;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;

const META_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "additionalProperties": false,
  "properties": {
    "collections": { "type": "array", "items": { "$ref": "#/definitions/resource" } },
    "singletons": { "type": "array", "items": { "$ref": "#/definitions/resource" } },
    "blobs": { "type": "array", "items": { "$ref": "#/definitions/resource" } },
    "relations": { "type": "array", "items": { "$ref": "#/definitions/relation" } },
    "shortcuts": { "type": "array", "items": { "$ref": "#/definitions/shortcut" } }
  },
  "definitions": {
    "permit": {
      "type": "object",
      "additionalProperties": false,
      "required": ["role", "operations"],
      "properties": {
        "role": { "type": "string" },
        "operations": {
          "type": "array",
          "items": { "enum": ["create", "read", "update", "delete", "list", "clear"] }
        },
        "selectors": { "type": "array", "items": { "type": "string" } }
      }
    },
    "resource": {
      "type": "object",
      "additionalProperties": false,
      "required": ["resource"],
      "properties": {
        "resource": { "type": "string" },
        "schema_id": { "type": "string" },
        "static_properties": { "type": "array", "items": { "type": "string" } },
        "searchable_properties": { "type": "array", "items": { "type": "string" } },
        "external_index": { "type": "string" },
        "default": {},
        "with_log": { "type": "boolean" },
        "with_companion_file": { "type": "boolean" },
        "companion_presigned_url_validity": { "type": "integer", "minimum": 1 },
        "permits": { "type": "array", "items": { "$ref": "#/definitions/permit" } }
      }
    },
    "relation": {
      "type": "object",
      "additionalProperties": false,
      "required": ["left", "right"],
      "properties": {
        "left": { "type": "string" },
        "right": { "type": "string" },
        "resource": { "type": "string" },
        "left_permits": { "type": "array", "items": { "$ref": "#/definitions/permit" } },
        "right_permits": { "type": "array", "items": { "$ref": "#/definitions/permit" } }
      }
    },
    "shortcut": {
      "type": "object",
      "additionalProperties": false,
      "required": ["shortcut", "target"],
      "properties": {
        "shortcut": { "type": "string" },
        "target": { "type": "string" },
        "roles": { "type": "array", "items": { "type": "string" } }
      }
    }
  }
}"##;

static COMPILED: Lazy<JSONSchema> = Lazy::new(|| {
    let schema: serde_json::Value =
        serde_json::from_str(META_SCHEMA).expect("embedded meta-schema is valid JSON");
    JSONSchema::compile(&schema).expect("embedded meta-schema compiles")
});

/// Validate a raw configuration document against the embedded meta-schema, rejecting
/// unknown keys. This runs before the document is deserialized into typed structs so
/// that an unrecognized key produces a clear config error rather than being silently
/// dropped by `serde`.
pub fn validate(document: &serde_json::Value) -> Result<(), KurbisioError> {
    COMPILED.validate(document).map_err(|errors| {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        KurbisioError::Config(messages.join("; "))
    })
}
