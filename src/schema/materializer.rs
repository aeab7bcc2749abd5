//! Idempotent DDL generation and migration driver (§4.1, §4.2).

use crate::model::config_doc::{Configuration, Relation, ResourceKind};
use crate::model::depth::{ordered_resources, OrderedResource};
use crate::model::fingerprint::{advisory_lock_key, fingerprint};
use crate::query::templates::{ancestor_table_name, QueryTemplates};
use crate::schema::advisory_lock;
use sqlx::{PgPool, Row};

pub const RELATION_DDL_KIND: &str = "relation";

/// The join table name for a relation: its declared `resource`, or `<left>_<right>`
/// (slashes would collide with the path-segment convention other tables use).
pub fn relation_table_name(relation: &Relation) -> String {
    relation
        .resource
        .clone()
        .unwrap_or_else(|| format!("{}_{}", relation.left, relation.right))
}

fn singular_id_column(resource: &str) -> String {
    let leaf = resource.trim_matches('/').rsplit('/').next().unwrap_or(resource);
    let singular = leaf.strip_suffix('s').filter(|s| !s.is_empty()).unwrap_or(leaf);
    format!("{singular}_id")
}

/// §4.7: a join table over the union of left/right identifier columns, with a
/// `UNIQUE` constraint over the tuple and a cascading foreign key to each side.
pub fn relation_ddl(relation: &Relation) -> Vec<String> {
    let table = relation_table_name(relation);
    let left_col = singular_id_column(&relation.left);
    let right_col = singular_id_column(&relation.right);

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" ( \
            serial BIGSERIAL PRIMARY KEY, \
            {left_col} UUID NOT NULL, \
            {right_col} UUID NOT NULL, \
            timestamp TIMESTAMPTZ NOT NULL DEFAULT now(), \
            UNIQUE ({left_col}, {right_col}), \
            FOREIGN KEY ({left_col}) REFERENCES \"{left}\" ({left_col}) ON DELETE CASCADE, \
            FOREIGN KEY ({right_col}) REFERENCES \"{right}\" ({right_col}) ON DELETE CASCADE \
        )",
        left = relation.left,
        right = relation.right,
    )];
    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS \"{}_left_idx\" ON \"{table}\" ({left_col})",
        sanitize(&table)
    ));
    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS \"{}_right_idx\" ON \"{table}\" ({right_col})",
        sanitize(&table)
    ));
    statements
}

/// One `CREATE TABLE IF NOT EXISTS` / `ALTER TABLE ADD COLUMN IF NOT EXISTS` /
/// `CREATE INDEX IF NOT EXISTS` batch for a single resource (and, if `with_log` is
/// set, its mirror table).
pub fn ddl_for_resource(resource: &OrderedResource) -> Vec<String> {
    let templates = QueryTemplates::build(&resource.collection.resource, resource.kind, &resource.collection);
    let mut statements = Vec::new();
    statements.extend(table_ddl(&templates.table, &resource.collection, &templates, false));
    if let Some(log_table) = &templates.log_table {
        statements.extend(table_ddl(log_table, &resource.collection, &templates, true));
    }
    statements
}

fn table_ddl(
    table: &str,
    collection: &crate::model::config_doc::Collection,
    templates: &QueryTemplates,
    is_log: bool,
) -> Vec<String> {
    let mut statements = Vec::new();

    let mut columns: Vec<String> = Vec::new();
    for parent in &templates.parent_columns {
        columns.push(format!("{parent} UUID NOT NULL"));
    }
    let is_singleton = templates.kind == ResourceKind::Singleton;
    if !is_singleton {
        columns.push(format!("{} UUID NOT NULL", templates.primary_column));
    }
    columns.push("timestamp TIMESTAMPTZ NOT NULL DEFAULT now()".to_string());
    columns.push("revision BIGINT NOT NULL DEFAULT 1".to_string());
    for prop in &templates.static_columns {
        columns.push(format!("{prop} VARCHAR NOT NULL DEFAULT ''"));
    }
    columns.push("properties JSON NOT NULL DEFAULT '{}'".to_string());
    if templates.kind == ResourceKind::Blob {
        columns.push("blob BYTEA NOT NULL".to_string());
    }
    if table.trim_end_matches("/log").ends_with("device") {
        columns.push("token UUID".to_string());
    }

    let primary_key = if is_log {
        None
    } else if is_singleton {
        Some(templates.parent_columns.clone())
    } else {
        Some(vec![templates.primary_column.clone()])
    };
    if let Some(pk) = &primary_key {
        columns.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }

    for parent in &templates.parent_columns {
        let parent_table = ancestor_table_name(table, parent);
        columns.push(format!(
            "FOREIGN KEY ({parent}) REFERENCES \"{parent_table}\" ({parent}) ON DELETE CASCADE"
        ));
    }

    statements.push(format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" ({})",
        columns.join(", ")
    ));

    for prop in &templates.static_columns {
        statements.push(format!(
            "ALTER TABLE \"{table}\" ADD COLUMN IF NOT EXISTS {prop} VARCHAR NOT NULL DEFAULT ''"
        ));
    }

    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS \"{}_timestamp_idx\" ON \"{table}\" (timestamp)",
        sanitize(table)
    ));
    if !templates.parent_columns.is_empty() {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS \"{}_parents_timestamp_idx\" ON \"{table}\" ({}, timestamp)",
            sanitize(table),
            templates.parent_columns.join(", ")
        ));
    }
    for prop in &collection.searchable_properties {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS \"{}_{prop}_idx\" ON \"{table}\" ({prop})",
            sanitize(table)
        ));
    }
    if let Some(external_index) = &collection.external_index {
        statements.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS \"{}_{external_index}_uq\" ON \"{table}\" ({external_index}) WHERE {external_index} <> ''",
            sanitize(table)
        ));
    }

    statements
}

fn sanitize(table: &str) -> String {
    table.replace('/', "_")
}

fn job_table_ddl() -> Vec<String> {
    vec![
        "CREATE TABLE IF NOT EXISTS \"_job_\" ( \
            serial BIGSERIAL PRIMARY KEY, \
            job VARCHAR NOT NULL, \
            type VARCHAR NOT NULL DEFAULT '', \
            key VARCHAR NOT NULL DEFAULT '', \
            resource VARCHAR NOT NULL DEFAULT '', \
            resource_id UUID, \
            payload JSON NOT NULL DEFAULT '{}', \
            timestamp TIMESTAMPTZ NOT NULL DEFAULT now(), \
            attempts_left INT NOT NULL DEFAULT 4, \
            context JSON NOT NULL DEFAULT '{}', \
            scheduled_at TIMESTAMPTZ \
        )"
        .to_string(),
        "CREATE UNIQUE INDEX IF NOT EXISTS \"_job_event_compression_uq\" ON \"_job_\" (type, key, resource, resource_id) WHERE job='event' AND attempts_left > 0".to_string(),
        "CREATE INDEX IF NOT EXISTS \"_job_ready_idx\" ON \"_job_\" (attempts_left, scheduled_at)".to_string(),
    ]
}

fn registry_table_ddl() -> Vec<String> {
    vec![
        "CREATE TABLE IF NOT EXISTS \"_registry_\" (key TEXT PRIMARY KEY, value TEXT NOT NULL)"
            .to_string(),
    ]
}

/// Migrate the database to match `config`, iff its fingerprint differs from the one
/// stored in `_registry_` (or `force` is set). Runs inside an advisory-locked
/// section keyed off `schema_name` so concurrent processes serialize (§4.1, §5).
pub async fn materialize(
    pool: &PgPool,
    schema_name: &str,
    config: &Configuration,
    raw_document: &str,
    force: bool,
) -> Result<bool, crate::error::KurbisioError> {
    let mut conn = pool.acquire().await?;
    let lock_key = advisory_lock_key(schema_name);

    advisory_lock::acquire(&mut conn, lock_key).await?;
    let result = run_migration(&mut conn, config, raw_document, force).await;
    let _ = advisory_lock::release(&mut conn, lock_key).await;
    result
}

async fn run_migration(
    conn: &mut sqlx::PgConnection,
    config: &Configuration,
    raw_document: &str,
    force: bool,
) -> Result<bool, crate::error::KurbisioError> {
    for stmt in registry_table_ddl() {
        sqlx::query(&stmt).execute(&mut *conn).await?;
    }
    for stmt in job_table_ddl() {
        sqlx::query(&stmt).execute(&mut *conn).await?;
    }

    let new_fingerprint = fingerprint(raw_document);
    let stored: Option<String> =
        sqlx::query("SELECT value FROM \"_registry_\" WHERE key = 'config_fingerprint'")
            .fetch_optional(&mut *conn)
            .await?
            .map(|row| row.get::<String, _>("value"));

    if !force && stored.as_deref() == Some(new_fingerprint.as_str()) {
        return Ok(false);
    }

    let relation_paths: Vec<String> = config
        .relations
        .iter()
        .map(|r| format!("{}/{}", r.left, r.right))
        .collect();

    for resource in ordered_resources(config) {
        // Relations appear in the ordered list only to fix their position; their
        // real DDL (a join table, not a leaf-collection table) is emitted below.
        if relation_paths.contains(&resource.collection.resource) {
            continue;
        }
        for stmt in ddl_for_resource(&resource) {
            sqlx::query(&stmt).execute(&mut *conn).await?;
        }
    }

    for relation in &config.relations {
        for stmt in relation_ddl(relation) {
            sqlx::query(&stmt).execute(&mut *conn).await?;
        }
    }

    sqlx::query(
        "INSERT INTO \"_registry_\" (key, value) VALUES ('config_fingerprint', $1) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
    )
    .bind(&new_fingerprint)
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config_doc::Collection;

    fn collection(resource: &str, with_log: bool) -> Collection {
        Collection {
            resource: resource.to_string(),
            schema_id: None,
            static_properties: vec!["name".to_string()],
            searchable_properties: vec!["email".to_string()],
            external_index: Some("identity".to_string()),
            default: None,
            with_log,
            with_companion_file: false,
            companion_presigned_url_validity: None,
            permits: vec![],
        }
    }

    #[test]
    fn ddl_includes_create_table_and_partial_unique_index() {
        let resource = OrderedResource {
            kind: ResourceKind::Collection,
            collection: collection("users", false),
            depth: 0,
        };
        let stmts = ddl_for_resource(&resource);
        assert!(stmts[0].starts_with("CREATE TABLE IF NOT EXISTS \"users\""));
        assert!(stmts.iter().any(|s| s.contains("WHERE identity <> ''")));
        assert!(stmts.iter().any(|s| s.contains("email")));
    }

    #[test]
    fn with_log_materializes_mirror_table() {
        let resource = OrderedResource {
            kind: ResourceKind::Collection,
            collection: collection("users", true),
            depth: 0,
        };
        let stmts = ddl_for_resource(&resource);
        assert!(stmts
            .iter()
            .any(|s| s.contains("CREATE TABLE IF NOT EXISTS \"users/log\"")));
    }

    #[test]
    fn job_table_ddl_has_compression_index() {
        let stmts = job_table_ddl();
        assert!(stmts
            .iter()
            .any(|s| s.contains("_job_event_compression_uq")));
    }

    #[test]
    fn relation_ddl_has_union_columns_and_unique_constraint() {
        let relation = Relation {
            left: "users".to_string(),
            right: "devices".to_string(),
            resource: None,
            left_permits: vec![],
            right_permits: vec![],
        };
        let stmts = relation_ddl(&relation);
        assert!(stmts[0].contains("CREATE TABLE IF NOT EXISTS \"users_devices\""));
        assert!(stmts[0].contains("user_id UUID NOT NULL"));
        assert!(stmts[0].contains("device_id UUID NOT NULL"));
        assert!(stmts[0].contains("UNIQUE (user_id, device_id)"));
        assert!(stmts[0].contains("REFERENCES \"users\" (user_id) ON DELETE CASCADE"));
        assert!(stmts[0].contains("REFERENCES \"devices\" (device_id) ON DELETE CASCADE"));
    }

    #[test]
    fn relation_table_name_defaults_to_left_underscore_right() {
        let relation = Relation {
            left: "users".to_string(),
            right: "devices".to_string(),
            resource: None,
            left_permits: vec![],
            right_permits: vec![],
        };
        assert_eq!(relation_table_name(&relation), "users_devices");
    }
}
