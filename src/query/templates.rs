//! Per-resource SQL query templates, precomputed once at build time (§4.3) so the
//! request hot path never builds SQL strings dynamically.

use crate::model::config_doc::{Collection, ResourceKind};

/// Turn a plural path segment into its singular `_id` column name. A small
/// heuristic (drop a trailing `s`) rather than a full English singularizer —
/// sufficient for the identifier-style segment names a resource path is made of.
fn column_for_segment(segment: &str) -> String {
    let singular = segment
        .strip_suffix('s')
        .filter(|s| !s.is_empty())
        .unwrap_or(segment);
    format!("{singular}_id")
}

fn segments(resource: &str) -> Vec<&str> {
    resource.trim_matches('/').split('/').collect()
}

/// The parameterized SQL fragments used by the collection/singleton/blob handlers.
/// Every `$n` placeholder is bound positionally by the caller; identifier
/// placeholders additionally support the `/all` wildcard via the
/// `($n='all' OR col=$n::UUID)` pattern (§4.3).
#[derive(Debug, Clone)]
pub struct QueryTemplates {
    pub table: String,
    pub log_table: Option<String>,
    pub kind: ResourceKind,
    /// `<parent>_id` columns, outermost ancestor first.
    pub parent_columns: Vec<String>,
    /// The column identifying a specific row within its parent: the entity's own
    /// `_id` for collections/blobs, or the last parent column for singletons (whose
    /// primary key *is* the parent tuple).
    pub primary_column: String,
    pub static_columns: Vec<String>,

    pub read_query: String,
    pub read_query_with_total: String,
    pub read_query_meta_with_total: String,
    pub sql_where_one: String,
    pub sql_where_all: String,
    pub sql_pagination_asc: String,
    pub sql_pagination_desc: String,
    pub insert_query: String,
    pub update_query: String,
    pub update_property_query_template: String,
    pub delete_query: String,
    pub clear_query: String,
    pub insert_query_log: Option<String>,
    pub read_query_log_with_total: Option<String>,
}

impl QueryTemplates {
    pub fn build(resource: &str, kind: ResourceKind, collection: &Collection) -> Self {
        let segs = segments(resource);
        let (parent_segs, leaf_seg) = segs.split_at(segs.len() - 1);
        let leaf_seg = leaf_seg[0];

        let parent_columns: Vec<String> = parent_segs.iter().map(|s| column_for_segment(s)).collect();
        let leaf_column = column_for_segment(leaf_seg);

        let primary_column = match kind {
            ResourceKind::Singleton => parent_columns
                .last()
                .cloned()
                .unwrap_or_else(|| leaf_column.clone()),
            ResourceKind::Collection | ResourceKind::Blob => leaf_column.clone(),
        };

        let table = table_name(resource);
        let log_table = collection.with_log.then(|| format!("{table}/log"));

        let mut all_id_columns = parent_columns.clone();
        if kind != ResourceKind::Singleton {
            all_id_columns.push(primary_column.clone());
        }

        let static_columns = collection.static_properties.clone();

        let select_columns = select_column_list(&all_id_columns, &static_columns, true);
        let select_columns_meta = select_column_list(&all_id_columns, &static_columns, false);

        let sql_where_one = where_one_clause(&all_id_columns);
        let sql_where_all = where_all_clause(&parent_columns);

        let read_query = format!(
            "SELECT {select_columns}, timestamp, revision FROM \"{table}\" WHERE {sql_where_one}"
        );
        let read_query_with_total = format!(
            "SELECT {select_columns}, timestamp, revision, count(*) OVER() AS total_count FROM \"{table}\" WHERE {sql_where_all}"
        );
        let read_query_meta_with_total = format!(
            "SELECT {select_columns_meta}, timestamp, revision, count(*) OVER() AS total_count FROM \"{table}\" WHERE {sql_where_all}"
        );

        let order_columns = format!("timestamp, {primary_column}");
        let sql_pagination_asc =
            format!("ORDER BY {order_columns} ASC LIMIT $LIMIT OFFSET $OFFSET");
        let sql_pagination_desc =
            format!("ORDER BY {order_columns} DESC LIMIT $LIMIT OFFSET $OFFSET");

        let insert_query = build_insert_query(&table, &all_id_columns, &static_columns);
        let update_query = build_update_query(&table, &all_id_columns, &static_columns);
        let update_property_query_template =
            format!("UPDATE \"{table}\" SET \"$PROP\" = $VALUE, revision = revision + 1, timestamp = timestamp WHERE {sql_where_one} RETURNING *");
        let delete_query =
            format!("DELETE FROM \"{table}\" WHERE {sql_where_one} RETURNING *");
        let clear_query = format!("DELETE FROM \"{table}\" WHERE {sql_where_all} RETURNING *");
        let insert_query_log = log_table
            .as_ref()
            .map(|lt| format!("INSERT INTO \"{lt}\" SELECT * FROM \"{table}\" WHERE {sql_where_one}"));
        let read_query_log_with_total = log_table.as_ref().map(|lt| {
            format!(
                "SELECT {select_columns}, timestamp, revision, count(*) OVER() AS total_count FROM \"{lt}\" WHERE {sql_where_one}"
            )
        });

        Self {
            table,
            log_table,
            kind,
            parent_columns,
            primary_column,
            static_columns,
            read_query,
            read_query_with_total,
            read_query_meta_with_total,
            sql_where_one,
            sql_where_all,
            sql_pagination_asc,
            sql_pagination_desc,
            insert_query,
            update_query,
            update_property_query_template,
            delete_query,
            clear_query,
            insert_query_log,
            read_query_log_with_total,
        }
    }
}

fn table_name(resource: &str) -> String {
    resource.trim_matches('/').to_string()
}

/// The table of the ancestor a given `<singular>_id` parent column refers to: the
/// prefix of `table`'s own path segments ending at whichever segment singularizes to
/// that column, e.g. `ancestor_table_name("accounts/users/devices", "user_id")` ==
/// `"accounts/users"`. Assumes the conventional one-registered-resource-per-path-
/// segment layout (§3.1) rather than tracking a separate table-to-columns catalogue.
pub fn ancestor_table_name(table: &str, parent_column: &str) -> String {
    let segs: Vec<&str> = table.trim_end_matches("/log").split('/').collect();
    let parent_singular = parent_column.trim_end_matches("_id");
    let end = segs
        .iter()
        .rposition(|s| s.trim_end_matches('s') == parent_singular);
    match end {
        Some(end) => segs[..=end].join("/"),
        None => format!("{parent_singular}s"),
    }
}

fn select_column_list(id_columns: &[String], static_columns: &[String], with_properties: bool) -> String {
    let mut cols: Vec<String> = id_columns.to_vec();
    cols.extend(static_columns.iter().cloned());
    if with_properties {
        cols.push("properties".to_string());
    }
    cols.join(", ")
}

/// `($n='all' OR col=$n::UUID)` for every identifier column, ANDed together —
/// matches a single row (or every row, per column, when the wildcard is used).
fn where_one_clause(id_columns: &[String]) -> String {
    id_columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let n = i + 1;
            format!("(${n}='all' OR {col}=${n}::UUID)")
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Same shape, but over the parent columns only — used by list/clear where the leaf
/// id is not part of the predicate.
fn where_all_clause(parent_columns: &[String]) -> String {
    if parent_columns.is_empty() {
        return "TRUE".to_string();
    }
    where_one_clause(parent_columns)
}

fn build_insert_query(table: &str, id_columns: &[String], static_columns: &[String]) -> String {
    let mut columns: Vec<String> = id_columns.to_vec();
    columns.extend(static_columns.iter().cloned());
    columns.push("properties".to_string());
    columns.push("timestamp".to_string());
    columns.push("revision".to_string());

    let placeholders: Vec<String> = (1..=columns.len() - 1)
        .map(|n| format!("${n}"))
        .chain(std::iter::once("1".to_string()))
        .collect();

    format!(
        "INSERT INTO \"{table}\" ({cols}) VALUES ({vals}) RETURNING *",
        cols = columns.join(", "),
        vals = placeholders.join(", ")
    )
}

/// The SET clause binds static columns, then `properties`, then the client-supplied
/// (optional) `timestamp` override, in that order; the WHERE clause's identifier
/// placeholders are numbered to start immediately after, so the three sections never
/// share a `$n`.
fn build_update_query(table: &str, id_columns: &[String], static_columns: &[String]) -> String {
    let mut set_columns: Vec<String> = static_columns.to_vec();
    set_columns.push("properties".to_string());

    let set_clause: Vec<String> = set_columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = ${}", i + 1))
        .collect();

    let timestamp_placeholder = set_columns.len() + 1;
    let where_start = timestamp_placeholder + 1;
    let where_clause: Vec<String> = id_columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let n = where_start + i;
            format!("(${n}='all' OR {col}=${n}::UUID)")
        })
        .collect();

    format!(
        "UPDATE \"{table}\" SET {set}, revision = revision + 1, timestamp = COALESCE(${timestamp_placeholder}, timestamp) WHERE {whr} RETURNING *",
        set = set_clause.join(", "),
        whr = where_clause.join(" AND ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config_doc::Collection;

    fn collection(resource: &str) -> Collection {
        Collection {
            resource: resource.to_string(),
            schema_id: None,
            static_properties: vec!["name".to_string()],
            searchable_properties: vec![],
            external_index: None,
            default: None,
            with_log: true,
            with_companion_file: false,
            companion_presigned_url_validity: None,
            permits: vec![],
        }
    }

    #[test]
    fn collection_templates_include_leaf_and_parent_columns() {
        let c = collection("users/devices");
        let t = QueryTemplates::build("users/devices", ResourceKind::Collection, &c);
        assert_eq!(t.parent_columns, vec!["user_id".to_string()]);
        assert_eq!(t.primary_column, "device_id");
        assert!(t.sql_where_one.contains("user_id"));
        assert!(t.sql_where_one.contains("device_id"));
        assert!(t.insert_query.contains("INSERT INTO \"users/devices\""));
    }

    #[test]
    fn singleton_primary_column_is_owner_column() {
        let c = collection("users/profile");
        let t = QueryTemplates::build("users/profile", ResourceKind::Singleton, &c);
        assert_eq!(t.primary_column, "user_id");
        assert!(t.parent_columns.contains(&"user_id".to_string()));
    }

    #[test]
    fn with_log_produces_log_table_and_insert() {
        let c = collection("users");
        let t = QueryTemplates::build("users", ResourceKind::Collection, &c);
        assert_eq!(t.log_table.as_deref(), Some("users/log"));
        assert!(t.insert_query_log.is_some());
    }

    #[test]
    fn root_collection_has_no_parent_columns() {
        let c = collection("users");
        let t = QueryTemplates::build("users", ResourceKind::Collection, &c);
        assert!(t.parent_columns.is_empty());
        assert_eq!(t.sql_where_all, "TRUE");
    }

    #[test]
    fn ancestor_table_name_keeps_the_full_path_prefix_for_deep_nesting() {
        assert_eq!(ancestor_table_name("accounts/users/devices", "account_id"), "accounts");
        assert_eq!(ancestor_table_name("accounts/users/devices", "user_id"), "accounts/users");
        assert_eq!(ancestor_table_name("users/devices", "user_id"), "users");
    }

    #[test]
    fn update_query_timestamp_placeholder_does_not_collide_with_where_clause() {
        let c = collection("users");
        let t = QueryTemplates::build("users", ResourceKind::Collection, &c);
        // one static column ("name") + properties = 2 SET placeholders, so the
        // timestamp override is $3 and the WHERE clause starts at $4.
        assert!(t.update_query.contains("COALESCE($3, timestamp)"));
        assert!(t.update_query.contains("$4='all'"));
    }
}
