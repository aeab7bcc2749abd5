//! The HTTP-handler factory (C4-C8): given a built [`crate::engine::Engine`], each
//! configured resource gets a full verb matrix wired against its precomputed
//! [`crate::query::QueryTemplates`].

pub mod blob;
pub mod collection;
pub mod registry;
pub mod relation;
pub mod shortcut;

use crate::error::KurbisioError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use jsonschema::JSONSchema;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-resource JSON Schema validation (§4.4.3), keyed by the `schema_id` a
/// collection declares. Schemas are supplied as raw JSON (typically loaded
/// alongside the declarative configuration document) and compiled once at
/// `Engine::build()` time.
#[derive(Default)]
pub struct SchemaRegistry {
    compiled: HashMap<String, JSONSchema>,
}

impl SchemaRegistry {
    pub fn compile(raw_schemas: HashMap<String, Value>) -> Result<Self, KurbisioError> {
        let mut compiled = HashMap::new();
        for (id, schema) in raw_schemas {
            let validator = JSONSchema::compile(&schema)
                .map_err(|e| KurbisioError::Config(format!("schema '{id}': {e}")))?;
            compiled.insert(id, validator);
        }
        Ok(Self { compiled })
    }

    /// No-op when the resource declares no `schema_id`, or when no schema was
    /// registered under that id (a resource is free to validate nothing).
    pub fn validate(&self, schema_id: Option<&str>, instance: &Value) -> Result<(), KurbisioError> {
        let Some(id) = schema_id else {
            return Ok(());
        };
        let Some(validator) = self.compiled.get(id) else {
            return Ok(());
        };
        validator.validate(instance).map_err(|errors| {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            KurbisioError::Validation(messages.join("; "))
        })
    }
}

/// Convert an arbitrary row from a generated table into a JSON object, one key per
/// column. The generated tables only ever contain a handful of Postgres types
/// (UUID, VARCHAR/TEXT, TIMESTAMPTZ, JSON, INT8/INT4/SERIAL, BOOL, BYTEA); anything
/// else decodes as its textual representation.
pub fn row_to_json(row: &PgRow) -> Result<Value, KurbisioError> {
    let mut obj = Map::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let is_null = row
            .try_get_raw(idx)
            .map(|raw| raw.is_null())
            .unwrap_or(true);
        let value = if is_null {
            Value::Null
        } else {
            decode_column(row, idx, column.type_info().name())?
        };
        obj.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(obj))
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, KurbisioError> {
    let value = match type_name {
        "UUID" => row
            .try_get::<Uuid, _>(idx)
            .map(|v| Value::String(v.to_string()))?,
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx)?,
        "TIMESTAMPTZ" | "TIMESTAMP" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(|v| Value::String(v.to_rfc3339()))?,
        "INT8" => row
            .try_get::<i64, _>(idx)
            .map(|v| Value::Number(v.into()))?,
        "INT4" | "SERIAL" => row
            .try_get::<i32, _>(idx)
            .map(|v| Value::Number(v.into()))?,
        "BOOL" => row.try_get::<bool, _>(idx).map(Value::Bool)?,
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|v| Value::String(BASE64.encode(v)))?,
        _ => row
            .try_get::<String, _>(idx)
            .map(Value::String)
            .unwrap_or(Value::Null),
    };
    Ok(value)
}

/// Split a merged JSON object into `(static column values, dynamic properties)` given
/// the resource's declared static/searchable columns (§4.4.3: "split the body into
/// known columns vs. dynamic properties").
pub fn split_properties(body: &Value, known_columns: &[String]) -> (Map<String, Value>, Value) {
    let mut known = Map::new();
    let mut dynamic = Map::new();
    if let Some(obj) = body.as_object() {
        for (key, value) in obj {
            if known_columns.iter().any(|c| c == key) {
                known.insert(key.clone(), value.clone());
            } else if !is_reserved_key(key) {
                dynamic.insert(key.clone(), value.clone());
            }
        }
    }
    (known, Value::Object(dynamic))
}

fn is_reserved_key(key: &str) -> bool {
    matches!(
        key,
        "timestamp" | "revision" | "properties" | "blob" | "token"
    ) || key.ends_with("_id")
}

/// Merge a collection's declared `default` object under a row's own values (row
/// values win), used when a singleton has no row yet (§4.4.1) or when listing merges
/// defaults into each item (§4.4.2).
pub fn merge_defaults(row: &Value, default: Option<&Value>) -> Value {
    let Some(Value::Object(default_obj)) = default else {
        return row.clone();
    };
    let mut merged = default_obj.clone();
    if let Some(row_obj) = row.as_object() {
        for (k, v) in row_obj {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Object(merged)
}
