//! Blob handlers (C6, §4.6): binary payloads with header-mapped metadata.
//!
//! The `blob BYTEA` column sits outside the generic [`QueryTemplates`] built for
//! JSON-bodied collections (§4.3 never mentions a binary column), so blob reads/
//! writes use their own small SQL built directly against the same table name,
//! rather than retrofitting the JSON-body templates — documented in DESIGN.md.

use super::collection::PathIds;
use super::row_to_json;
use crate::auth::{Actor, AuthContext};
use crate::error::KurbisioError;
use crate::jobs::store::PostgresJobStore;
use crate::jobs::worker::JobWorkerPool;
use crate::model::config_doc::{Collection, Operation};
use crate::notification::NotificationRegistry;
use crate::pagination::{ListQuery, PaginationHeaders};
use crate::query::{Identifier, QueryTemplates};
use crate::storage::{companion_key, BaseCompanionStorage, PresignedOperation};
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Canonical header name for a blob's static/searchable columns, e.g.
/// `content_type` <-> `Content-Type` (§4.6).
pub fn column_to_header(column: &str) -> String {
    column
        .split('_')
        .map(|part| {
            let mut c = part.chars();
            match c.next() {
                Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

pub const META_DATA_HEADER: &str = "Kurbisio-Meta-Data";

pub struct BlobHandler {
    pub resource: String,
    pub config: Collection,
    pub templates: QueryTemplates,
    pub pool: PgPool,
    pub notifications: Arc<NotificationRegistry>,
    pub jobs: Arc<PostgresJobStore>,
    pub job_pool: Arc<JobWorkerPool>,
    pub storage: Option<Arc<dyn BaseCompanionStorage>>,
    pub schema_name: String,
    pub default_presigned_ttl: Duration,
}

pub struct BlobMeta {
    pub body: Value,
    pub blob: Vec<u8>,
}

impl BlobHandler {
    fn blob_select_query(&self) -> String {
        format!(
            "SELECT *, blob FROM \"{}\" WHERE {}",
            self.templates.table, self.templates.sql_where_one
        )
    }

    /// Every id column this request addresses, paired with the bound value — the
    /// scope a matched permit's `selectors` are checked against.
    fn id_columns(&self, ids: &PathIds) -> Vec<(&str, String)> {
        let mut columns: Vec<&str> = self.templates.parent_columns.iter().map(String::as_str).collect();
        columns.push(self.templates.primary_column.as_str());
        columns.into_iter().zip(ids.0.iter().map(Identifier::as_sql_param)).collect()
    }

    fn parent_id_columns(&self, parent_ids: &PathIds) -> Vec<(&str, String)> {
        self.templates
            .parent_columns
            .iter()
            .map(String::as_str)
            .zip(parent_ids.0.iter().map(Identifier::as_sql_param))
            .collect()
    }

    /// Read a blob's bytes plus its header-mappable metadata.
    pub async fn read(&self, ids: &PathIds, ctx: &AuthContext) -> Result<BlobMeta, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Read, &self.config.permits)
            .check_scoped(&self.id_columns(ids))?;

        let params: Vec<String> = ids.0.iter().map(Identifier::as_sql_param).collect();
        let select_query = self.blob_select_query();
        let mut q = sqlx::query(&select_query);
        for p in &params {
            q = q.bind(p);
        }
        let row = q.fetch_optional(&self.pool).await?.ok_or(KurbisioError::NotFound)?;
        let blob: Vec<u8> = row.try_get("blob")?;
        let body = row_to_json(&row)?;
        Ok(BlobMeta { body, blob })
    }

    /// Create or replace a blob's bytes and metadata headers. Returns whether the
    /// row was freshly inserted, so the caller can answer 201 vs. 200 (§6).
    pub async fn write(
        &self,
        parent_ids: &PathIds,
        id: Uuid,
        ctx: &AuthContext,
        headers: &HashMap<String, String>,
        meta_data: Value,
        blob: Vec<u8>,
        silent: bool,
    ) -> Result<(Value, bool), KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Create, &self.config.permits)
            .check_scoped(&self.parent_id_columns(parent_ids))?;

        let mut id_params: Vec<String> = parent_ids.0.iter().map(Identifier::as_sql_param).collect();
        id_params.push(id.to_string());

        let mut all_columns: Vec<String> = self.templates.parent_columns.clone();
        all_columns.push(self.templates.primary_column.clone());

        let mut columns = all_columns.clone();
        columns.extend(self.config.static_properties.clone());
        columns.push("properties".to_string());
        columns.push("blob".to_string());
        columns.push("timestamp".to_string());

        let placeholders: Vec<String> = (1..=columns.len()).map(|n| format!("${n}")).collect();
        let update_assignments: Vec<String> = columns
            .iter()
            .skip(all_columns.len())
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .chain(std::iter::once("revision = \"%TABLE%\".revision + 1".to_string()))
            .collect();
        let conflict_target = all_columns.join(", ");
        let sql = format!(
            "INSERT INTO \"{table}\" ({cols}) VALUES ({vals}) \
             ON CONFLICT ({conflict_target}) DO UPDATE SET {update} \
             RETURNING *, (xmax = 0) AS inserted",
            table = self.templates.table,
            cols = columns.join(", "),
            vals = placeholders.join(", "),
            update = update_assignments.join(", ").replace("%TABLE%", &self.templates.table),
        );

        let mut tx = self.pool.begin().await?;
        let mut q = sqlx::query(&sql);
        for p in &id_params {
            q = q.bind(p);
        }
        for col in &self.config.static_properties {
            let header = column_to_header(col);
            q = q.bind(headers.get(&header).cloned().unwrap_or_default());
        }
        q = q.bind(meta_data);
        q = q.bind(blob);
        q = q.bind(Utc::now());

        let row = q.fetch_one(&mut *tx).await?;
        let mut result = row_to_json(&row)?;
        let inserted = match &mut result {
            Value::Object(obj) => obj.remove("inserted").and_then(|v| v.as_bool()).unwrap_or(false),
            _ => false,
        };

        if self.config.with_companion_file {
            if let Some(storage) = &self.storage {
                let key = companion_key(&self.schema_name, &self.resource, &id_params);
                let ttl = self
                    .config
                    .companion_presigned_url_validity
                    .map(Duration::from_secs)
                    .unwrap_or(self.default_presigned_ttl);
                let url = storage
                    .get_presigned_url(PresignedOperation::Put, &key, ttl)
                    .await
                    .map_err(|e| KurbisioError::storage(1101, e))?;
                if let Value::Object(obj) = &mut result {
                    obj.insert("companion_upload_url".into(), Value::String(url));
                }
            }
        }

        if !silent && self.notifications.has_handler(&self.resource, Operation::Create) {
            PostgresJobStore::insert_notification(
                &mut tx,
                Operation::Create.as_str(),
                &self.resource,
                Some(id),
                result.clone(),
            )
            .await?;
        }
        tx.commit().await?;
        self.job_pool.trigger();

        Ok((result, inserted))
    }

    pub async fn delete(&self, ids: &PathIds, ctx: &AuthContext, silent: bool) -> Result<Value, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Delete, &self.config.permits)
            .check_scoped(&self.id_columns(ids))?;

        let params: Vec<String> = ids.0.iter().map(Identifier::as_sql_param).collect();
        let sql = format!(
            "DELETE FROM \"{}\" WHERE {} RETURNING *",
            self.templates.table, self.templates.sql_where_one
        );
        let mut tx = self.pool.begin().await?;
        let mut q = sqlx::query(&sql);
        for p in &params {
            q = q.bind(p);
        }
        let row = q.fetch_optional(&mut *tx).await?.ok_or(KurbisioError::NotFound)?;
        let meta = row_to_json(&row)?;

        if self.config.with_companion_file {
            if let Some(storage) = &self.storage {
                let key = companion_key(&self.schema_name, &self.resource, &params);
                storage
                    .delete_all_with_prefix(&key)
                    .await
                    .map_err(|e| KurbisioError::storage(1102, e))?;
            }
        }

        if !silent && self.notifications.has_handler(&self.resource, Operation::Delete) {
            PostgresJobStore::insert_notification(
                &mut tx,
                Operation::Delete.as_str(),
                &self.resource,
                ids.0.last().and_then(Identifier::as_uuid),
                meta.clone(),
            )
            .await?;
        }
        tx.commit().await?;
        self.job_pool.trigger();

        Ok(meta)
    }

    /// §4.6.2: meta-only listing (never streams blob bytes back in bulk), with the
    /// same pagination/filter/order support `CollectionHandler::list` gives
    /// ordinary collections.
    pub async fn list_meta(
        &self,
        parent_ids: &PathIds,
        ctx: &AuthContext,
        query: &ListQuery,
    ) -> Result<(Vec<Value>, PaginationHeaders), KurbisioError> {
        Actor::new(ctx)
            .can(Operation::List, &self.config.permits)
            .check_scoped(&self.parent_id_columns(parent_ids))?;

        let mut binds: Vec<String> = parent_ids.0.iter().map(Identifier::as_sql_param).collect();

        let pagination = match query.order {
            crate::pagination::Order::Asc => &self.templates.sql_pagination_asc,
            crate::pagination::Order::Desc => &self.templates.sql_pagination_desc,
        };

        let mut conditions = Vec::new();
        if let Some(from) = query.from {
            binds.push(from.to_rfc3339());
            conditions.push(format!("timestamp >= ${}::TIMESTAMPTZ", binds.len()));
        }
        if let Some(until) = query.until {
            binds.push(until.to_rfc3339());
            conditions.push(format!("timestamp <= ${}::TIMESTAMPTZ", binds.len()));
        }
        for filter in query.filters.iter().chain(query.search.iter()) {
            let is_static = self
                .config
                .static_properties
                .iter()
                .any(|p| p == &filter.key);
            let column = if is_static {
                filter.key.clone()
            } else {
                format!("properties->>'{}'", filter.key.replace('\'', ""))
            };
            binds.push(filter.value.clone());
            let n = binds.len();
            conditions.push(match filter.op {
                crate::pagination::FilterOp::Eq => format!("{column}=${n}"),
                crate::pagination::FilterOp::Like => format!("{column} LIKE ${n}"),
            });
        }

        let mut sql = self.templates.read_query_meta_with_total.clone();
        if !conditions.is_empty() {
            sql.push_str(" AND ");
            sql.push_str(&conditions.join(" AND "));
        }
        let limit_placeholder = binds.len() + 1;
        let offset_placeholder = binds.len() + 2;
        let pagination_clause = pagination
            .replace("$LIMIT", &format!("${limit_placeholder}"))
            .replace("$OFFSET", &format!("${offset_placeholder}"));
        sql.push(' ');
        sql.push_str(&pagination_clause);

        let mut q = sqlx::query(&sql);
        for b in &binds {
            q = q.bind(b);
        }
        q = q.bind(query.limit as i64).bind(query.offset() as i64);

        let rows = q.fetch_all(&self.pool).await?;
        let total_count = rows
            .first()
            .map(|r| r.try_get::<i64, _>("total_count"))
            .transpose()?
            .unwrap_or(0);

        let items = rows.iter().map(row_to_json).collect::<Result<Vec<_>, _>>()?;
        Ok((items, PaginationHeaders::compute(query, total_count)))
    }
}
