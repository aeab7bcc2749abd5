//! Collection (and singleton) CRUD/list handlers (C5, §4.4-§4.5).
//!
//! Grounded on the teacher's handler modules for request shape (JSON body in,
//! `KurbisioError`-mapped `IntoResponse` out) and `kernel/jobs/job.rs` for the
//! commit-then-enqueue transaction pattern, generalized from fixed domain handlers to
//! a single generic handler driven by a resource's [`QueryTemplates`].

use super::{merge_defaults, row_to_json, split_properties, SchemaRegistry};
use crate::auth::{Actor, AuthContext};
use crate::error::KurbisioError;
use crate::interceptor::{InterceptorContext, InterceptorRegistry};
use crate::jobs::store::PostgresJobStore;
use crate::jobs::worker::JobWorkerPool;
use crate::model::config_doc::{Collection, Operation, ResourceKind};
use crate::notification::NotificationRegistry;
use crate::pagination::{ListQuery, PaginationHeaders};
use crate::query::{Identifier, QueryTemplates};
use crate::storage::{companion_key, BaseCompanionStorage, PresignedOperation};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Everything a generic collection/singleton handler needs to serve one resource.
/// One instance is built per declared resource in `Engine::build()` and shared
/// (behind `Arc`) across every request for that resource.
pub struct CollectionHandler {
    pub resource: String,
    pub kind: ResourceKind,
    pub config: Collection,
    pub templates: QueryTemplates,
    pub pool: PgPool,
    pub interceptors: Arc<InterceptorRegistry>,
    pub notifications: Arc<NotificationRegistry>,
    pub jobs: Arc<PostgresJobStore>,
    pub job_pool: Arc<JobWorkerPool>,
    pub schemas: Arc<SchemaRegistry>,
    pub storage: Option<Arc<dyn BaseCompanionStorage>>,
    pub schema_name: String,
    pub default_presigned_ttl: Duration,
}

/// Resolved path identifiers for one request: every parent segment, in order, plus
/// the leaf (for singletons the leaf coincides with the last parent).
#[derive(Debug, Clone)]
pub struct PathIds(pub Vec<Identifier>);

impl PathIds {
    fn as_params(&self) -> Vec<String> {
        self.0.iter().map(Identifier::as_sql_param).collect()
    }

    fn parent_params(&self, parent_count: usize) -> Vec<String> {
        self.0[..parent_count]
            .iter()
            .map(Identifier::as_sql_param)
            .collect()
    }
}

impl CollectionHandler {
    fn known_columns(&self) -> Vec<String> {
        self.config.static_properties.clone()
    }

    /// Every id column this request addresses (parent chain, plus the leaf for
    /// non-singletons), paired with the value actually bound for it — the scope a
    /// matched permit's `selectors` are checked against.
    fn id_columns(&self, ids: &PathIds) -> Vec<(&str, String)> {
        let mut columns: Vec<&str> = self.templates.parent_columns.iter().map(String::as_str).collect();
        if self.kind != ResourceKind::Singleton {
            columns.push(self.templates.primary_column.as_str());
        }
        columns.into_iter().zip(ids.as_params()).collect()
    }

    fn parent_id_columns(&self, parent_ids: &PathIds) -> Vec<(&str, String)> {
        self.templates
            .parent_columns
            .iter()
            .map(String::as_str)
            .zip(parent_ids.as_params())
            .collect()
    }

    async fn enqueue_notification(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        op: Operation,
        resource_id: Option<Uuid>,
        payload: Value,
        silent: bool,
    ) -> Result<(), KurbisioError> {
        if silent || !self.notifications.has_handler(&self.resource, op) {
            return Ok(());
        }
        PostgresJobStore::insert_notification(tx, op.as_str(), &self.resource, resource_id, payload)
            .await?;
        Ok(())
    }

    /// §4.4.1: resolve the identifier chain, apply the interceptor, compute ETag,
    /// honour `If-None-Match`. `nointercept` bypasses the interceptor.
    pub async fn read(
        &self,
        ids: &PathIds,
        ctx: &AuthContext,
        nointercept: bool,
    ) -> Result<Option<Value>, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Read, &self.config.permits)
            .check_scoped(&self.id_columns(ids))?;

        if self.kind != ResourceKind::Singleton && ids.0.last().map(Identifier::is_all) == Some(true)
        {
            return Err(KurbisioError::BadRequest(
                "'all' is not a valid identifier for a single-resource read".into(),
            ));
        }

        let params = ids.as_params();
        let mut query = sqlx::query(&self.templates.read_query);
        for p in &params {
            query = query.bind(p);
        }
        let row = query.fetch_optional(&self.pool).await?;

        let body = match row {
            Some(row) => row_to_json(&row)?,
            None if self.kind == ResourceKind::Singleton => {
                self.owner_must_exist(ids).await?;
                match &self.config.default {
                    Some(default) => merge_defaults(&json!({}), Some(default)),
                    None => return Ok(None),
                }
            }
            None => return Err(KurbisioError::NotFound),
        };

        let body = merge_defaults(&body, self.config.default.as_ref());

        if nointercept {
            return Ok(Some(body));
        }

        let result = self
            .interceptors
            .intercept(&self.resource, Operation::Read, InterceptorContext::new(), Some(body))
            .await?;
        Ok(result)
    }

    async fn owner_must_exist(&self, ids: &PathIds) -> Result<(), KurbisioError> {
        if self.templates.parent_columns.is_empty() {
            return Ok(());
        }
        let parent_count = self.templates.parent_columns.len();
        let params = ids.parent_params(parent_count);
        let placeholders: Vec<String> = self
            .templates
            .parent_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c}=${}", i + 1))
            .collect();
        let owner_table = self
            .templates
            .parent_columns
            .last()
            .map(|c| crate::query::ancestor_table_name(&self.templates.table, c))
            .unwrap_or_default();
        let sql = format!(
            "SELECT 1 FROM \"{}\" WHERE {}",
            owner_table,
            placeholders.join(" AND ")
        );
        let mut query = sqlx::query(&sql);
        for p in &params {
            query = query.bind(p);
        }
        let exists = query.fetch_optional(&self.pool).await?;
        if exists.is_none() {
            return Err(KurbisioError::NotFound);
        }
        Ok(())
    }

    /// §4.4.2: offset-paginated listing scoped to the parent identifiers.
    pub async fn list(
        &self,
        parent_ids: &PathIds,
        ctx: &AuthContext,
        query: &ListQuery,
    ) -> Result<(Vec<Value>, PaginationHeaders), KurbisioError> {
        Actor::new(ctx)
            .can(Operation::List, &self.config.permits)
            .check_scoped(&self.parent_id_columns(parent_ids))?;

        let sql_template = if query.metaonly {
            &self.templates.read_query_meta_with_total
        } else {
            &self.templates.read_query_with_total
        };

        let mut conditions = Vec::new();
        let mut binds: Vec<String> = parent_ids.as_params();

        let pagination = match query.order {
            crate::pagination::Order::Asc => &self.templates.sql_pagination_asc,
            crate::pagination::Order::Desc => &self.templates.sql_pagination_desc,
        };

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

        // §4.11: a `next_token` seeks past the cursor's position instead of paging by
        // offset -- the same `(timestamp, id)` ordering the LIMIT/OFFSET clause below
        // sorts by, so the comparison direction has to match `query.order`.
        if let Some(token) = &query.next_token {
            let cursor = crate::cursor::Cursor::decode(token)
                .map_err(|e| KurbisioError::BadRequest(format!("invalid next_token: {e}")))?;
            binds.push(cursor.timestamp().to_rfc3339());
            let ts_n = binds.len();
            binds.push(cursor.primary_id.to_string());
            let id_n = binds.len();
            let op = match query.order {
                crate::pagination::Order::Asc => ">",
                crate::pagination::Order::Desc => "<",
            };
            conditions.push(format!(
                "(timestamp, {col}) {op} (${ts_n}::TIMESTAMPTZ, ${id_n}::UUID)",
                col = self.templates.primary_column
            ));
        }

        let mut sql = sql_template.to_string();
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

        let offset = if query.next_token.is_some() { 0 } else { query.offset() };
        let mut q = sqlx::query(&sql);
        for b in &binds {
            q = q.bind(b);
        }
        q = q.bind(query.limit as i64).bind(offset as i64);

        let rows = q.fetch_all(&self.pool).await?;
        let total_count = rows
            .first()
            .map(|r| r.try_get::<i64, _>("total_count"))
            .transpose()?
            .unwrap_or(0);

        let total_count = if rows.is_empty() {
            self.recount_total(parent_ids).await?
        } else {
            total_count
        };

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let value = merge_defaults(&row_to_json(&row)?, self.config.default.as_ref());
            items.push(value);
        }

        Ok((items, PaginationHeaders::compute(query, total_count)))
    }

    /// §4.4: `GET /plural/{id}/log`, a listing over the `with_log` mirror table
    /// scoped to one specific resource instance rather than its parent.
    pub async fn list_log(
        &self,
        ids: &PathIds,
        ctx: &AuthContext,
        query: &ListQuery,
    ) -> Result<(Vec<Value>, PaginationHeaders), KurbisioError> {
        Actor::new(ctx)
            .can(Operation::List, &self.config.permits)
            .check_scoped(&self.id_columns(ids))?;

        let Some(sql_template) = &self.templates.read_query_log_with_total else {
            return Err(KurbisioError::NotFound);
        };

        let mut binds: Vec<String> = ids.as_params();

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

        let mut sql = sql_template.to_string();
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
        let total_count = if rows.is_empty() {
            self.recount_log_total(ids).await?
        } else {
            total_count
        };

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(merge_defaults(&row_to_json(&row)?, self.config.default.as_ref()));
        }

        Ok((items, PaginationHeaders::compute(query, total_count)))
    }

    async fn recount_log_total(&self, ids: &PathIds) -> Result<i64, KurbisioError> {
        let log_table = self
            .templates
            .log_table
            .as_ref()
            .expect("recount_log_total only called once read_query_log_with_total matched Some");
        let params = ids.as_params();
        let sql = format!(
            "SELECT count(*) FROM \"{}\" WHERE {}",
            log_table, self.templates.sql_where_one
        );
        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for p in &params {
            q = q.bind(p);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    async fn recount_total(&self, parent_ids: &PathIds) -> Result<i64, KurbisioError> {
        let params = parent_ids.as_params();
        let sql = format!(
            "SELECT count(*) FROM \"{}\" WHERE {}",
            self.templates.table, self.templates.sql_where_all
        );
        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for p in &params {
            q = q.bind(p);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    /// §4.4.3: create a new row. `id` is `None` when called directly from the POST
    /// handler (a fresh UUID is generated); `Some` when delegated from upsert.
    pub async fn create(
        &self,
        parent_ids: &PathIds,
        id: Option<Uuid>,
        ctx: &AuthContext,
        mut body: Value,
        force: bool,
        silent: bool,
    ) -> Result<Value, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Create, &self.config.permits)
            .check_scoped(&self.parent_id_columns(parent_ids))?;

        let entity_id = id.unwrap_or_else(Uuid::new_v4);
        body = merge_defaults(&body, self.config.default.as_ref());

        if !force {
            self.schemas.validate(self.config.schema_id.as_deref(), &body)?;
        }

        let body = self
            .interceptors
            .intercept(&self.resource, Operation::Create, InterceptorContext::new(), Some(body))
            .await?
            .unwrap_or(Value::Null);

        let (known, properties) = split_properties(&body, &self.known_columns());

        let mut id_params: Vec<String> = parent_ids.as_params();
        if self.kind != ResourceKind::Singleton {
            id_params.push(entity_id.to_string());
        }

        let mut tx = self.pool.begin().await?;
        let mut q = sqlx::query(&self.templates.insert_query);
        for p in &id_params {
            q = q.bind(p);
        }
        for col in &self.config.static_properties {
            let v = known.get(col).and_then(Value::as_str).unwrap_or("").to_string();
            q = q.bind(v);
        }
        q = q.bind(properties);
        q = q.bind(Utc::now());

        let row = q.fetch_one(&mut *tx).await?;
        let mut result = row_to_json(&row)?;

        if self.config.with_companion_file {
            if let Some(storage) = &self.storage {
                let key = self.companion_key_for(parent_ids, entity_id);
                let ttl = self
                    .config
                    .companion_presigned_url_validity
                    .map(Duration::from_secs)
                    .unwrap_or(self.default_presigned_ttl);
                let url = storage
                    .get_presigned_url(PresignedOperation::Put, &key, ttl)
                    .await
                    .map_err(|e| KurbisioError::storage(1001, e))?;
                if let Value::Object(obj) = &mut result {
                    obj.insert("companion_upload_url".into(), Value::String(url));
                }
            }
        }

        self.enqueue_notification(&mut tx, Operation::Create, Some(entity_id), result.clone(), silent)
            .await?;
        tx.commit().await?;
        self.job_pool.trigger();

        Ok(result)
    }

    fn companion_key_for(&self, parent_ids: &PathIds, entity_id: Uuid) -> String {
        let mut chain: Vec<String> = parent_ids.as_params();
        chain.push(entity_id.to_string());
        companion_key(&self.schema_name, &self.resource, &chain)
    }

    /// §4.4.4: PUT/PATCH upsert by primary id. `is_patch` selects deep-merge
    /// (PATCH) vs. full replace delegated to create (PUT, non-singleton, not found).
    /// Returns whether the row was freshly created, so the caller can answer 201
    /// vs. 200 (§6, testable property 8).
    pub async fn upsert(
        &self,
        ids: &PathIds,
        ctx: &AuthContext,
        body: Value,
        is_patch: bool,
        force: bool,
        silent: bool,
    ) -> Result<(Value, bool), KurbisioError> {
        let params = ids.as_params();
        let mut q = sqlx::query(&self.templates.read_query);
        for p in &params {
            q = q.bind(p);
        }
        let existing = q.fetch_optional(&self.pool).await?;

        let Some(existing_row) = existing else {
            if is_patch {
                return Err(KurbisioError::NotFound);
            }
            let parent_count = self.templates.parent_columns.len();
            let parent_ids = PathIds(ids.0[..parent_count].to_vec());
            let leaf_id = ids.0.last().and_then(Identifier::as_uuid);
            let row = self.create(&parent_ids, leaf_id, ctx, body, force, silent).await?;
            return Ok((row, true));
        };

        Actor::new(ctx)
            .can(Operation::Update, &self.config.permits)
            .check_scoped(&self.id_columns(ids))?;

        let existing_json = row_to_json(&existing_row)?;
        if let Some(requested) = body.get("revision").and_then(Value::as_i64) {
            if requested != 0 {
                let stored = existing_row.try_get::<i64, _>("revision").unwrap_or(0);
                if requested != stored {
                    return Err(KurbisioError::ConflictRevision(existing_json));
                }
            }
        }

        let merged = if is_patch {
            deep_merge(&existing_json, &body)
        } else {
            body
        };
        let merged = merge_defaults(&merged, self.config.default.as_ref());

        if !force {
            self.schemas.validate(self.config.schema_id.as_deref(), &merged)?;
        }

        let merged = self
            .interceptors
            .intercept(&self.resource, Operation::Update, InterceptorContext::new(), Some(merged))
            .await?
            .unwrap_or(Value::Null);

        let (known, properties) = split_properties(&merged, &self.known_columns());
        let client_timestamp = merged
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let mut tx = self.pool.begin().await?;
        let mut q = sqlx::query(&self.templates.update_query);
        for col in &self.config.static_properties {
            let v = known.get(col).and_then(Value::as_str).unwrap_or("").to_string();
            q = q.bind(v);
        }
        q = q.bind(properties);
        q = q.bind(client_timestamp);
        for p in &params {
            q = q.bind(p);
        }

        let row = q.fetch_one(&mut *tx).await?;
        let result = row_to_json(&row)?;

        if let Some(log_insert) = &self.templates.insert_query_log {
            let mut log_q = sqlx::query(log_insert);
            for p in &params {
                log_q = log_q.bind(p);
            }
            log_q.execute(&mut *tx).await?;
        }

        self.enqueue_notification(
            &mut tx,
            Operation::Update,
            ids.0.last().and_then(Identifier::as_uuid),
            result.clone(),
            silent,
        )
        .await?;
        tx.commit().await?;
        self.job_pool.trigger();

        Ok((result, false))
    }

    /// §4.4.5: delete by primary id.
    pub async fn delete(&self, ids: &PathIds, ctx: &AuthContext, silent: bool) -> Result<Value, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Delete, &self.config.permits)
            .check_scoped(&self.id_columns(ids))?;

        self.interceptors
            .intercept(&self.resource, Operation::Delete, InterceptorContext::new(), None)
            .await?;

        let params = ids.as_params();
        let mut tx = self.pool.begin().await?;
        let mut q = sqlx::query(&self.templates.delete_query);
        for p in &params {
            q = q.bind(p);
        }
        let row = q.fetch_optional(&mut *tx).await?.ok_or(KurbisioError::NotFound)?;
        let deleted = row_to_json(&row)?;

        if self.config.with_companion_file {
            if let Some(storage) = &self.storage {
                let leaf_id = ids.0.last().and_then(Identifier::as_uuid).unwrap_or_default();
                let key = self.companion_key_for(ids, leaf_id);
                storage
                    .delete_all_with_prefix(&key)
                    .await
                    .map_err(|e| KurbisioError::storage(1002, e))?;
            }
        }

        self.enqueue_notification(
            &mut tx,
            Operation::Delete,
            ids.0.last().and_then(Identifier::as_uuid),
            deleted.clone(),
            silent,
        )
        .await?;
        tx.commit().await?;
        self.job_pool.trigger();

        Ok(deleted)
    }

    /// §4.4.5: mass delete scoped to the parent identifiers.
    pub async fn clear(
        &self,
        parent_ids: &PathIds,
        ctx: &AuthContext,
        silent: bool,
    ) -> Result<u64, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Clear, &self.config.permits)
            .check_scoped(&self.parent_id_columns(parent_ids))?;

        let params = parent_ids.as_params();
        let mut tx = self.pool.begin().await?;
        let mut q = sqlx::query(&self.templates.clear_query);
        for p in &params {
            q = q.bind(p);
        }
        let rows = q.fetch_all(&mut *tx).await?;

        if self.config.with_companion_file {
            if let Some(storage) = &self.storage {
                let prefix = companion_key(&self.schema_name, &self.resource, &params);
                storage
                    .delete_all_with_prefix(&prefix)
                    .await
                    .map_err(|e| KurbisioError::storage(1003, e))?;
            }
        }

        let selectors_payload = json!({ "selectors": params });
        self.enqueue_notification(&mut tx, Operation::Clear, None, selectors_payload, silent)
            .await?;
        tx.commit().await?;
        self.job_pool.trigger();

        Ok(rows.len() as u64)
    }

    /// §4.4.6: single-property update via `PUT /plural/{id}/<prop>/{value}`.
    pub async fn update_property(
        &self,
        ids: &PathIds,
        ctx: &AuthContext,
        property: &str,
        value: &str,
        silent: bool,
    ) -> Result<Value, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Update, &self.config.permits)
            .check_scoped(&self.id_columns(ids))?;

        if !self.config.static_properties.iter().any(|p| p == property) {
            return Err(KurbisioError::BadRequest(format!(
                "'{property}' is not a static property of {}",
                self.resource
            )));
        }

        let sql = self
            .templates
            .update_property_query_template
            .replace("\"$PROP\"", &format!("\"{property}\""))
            .replace("$VALUE", "$1");
        let params = ids.as_params();
        let sql = renumber_where_clause(&sql, 1);

        let mut tx = self.pool.begin().await?;
        let mut q = sqlx::query(&sql);
        q = q.bind(value.to_string());
        for p in &params {
            q = q.bind(p);
        }
        let row = q.fetch_one(&mut *tx).await?;
        let result = row_to_json(&row)?;

        let payload = json!({ property: value });
        self.enqueue_notification(
            &mut tx,
            Operation::Update,
            ids.0.last().and_then(Identifier::as_uuid),
            payload,
            silent,
        )
        .await?;
        tx.commit().await?;
        self.job_pool.trigger();

        Ok(result)
    }
}

/// The `update_property_query_template` hardcodes its WHERE clause placeholders
/// assuming `$VALUE` occupies position 1; once substituted, every identifier
/// placeholder must shift up by `offset` positions to follow it.
fn renumber_where_clause(sql: &str, offset: usize) -> String {
    let mut result = sql.to_string();
    for n in (1..=8).rev() {
        result = result.replace(&format!("${n}="), &format!("${}=", n + offset));
        result = result.replace(&format!("${n}::UUID"), &format!("${}::UUID", n + offset));
    }
    result
}

fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in overlay_map {
                let merged_value = match merged.get(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v.clone(),
                };
                merged.insert(k.clone(), merged_value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_overwrites_scalars_and_merges_nested_objects() {
        let base = json!({"name": "Jo", "address": {"city": "A", "zip": "1"}});
        let overlay = json!({"address": {"city": "B"}});
        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged["name"], "Jo");
        assert_eq!(merged["address"]["city"], "B");
        assert_eq!(merged["address"]["zip"], "1");
    }

    #[test]
    fn path_ids_as_params_preserves_order_and_wildcard() {
        let id = Uuid::new_v4();
        let ids = PathIds(vec![Identifier::All, Identifier::Id(id)]);
        assert_eq!(ids.as_params(), vec!["all".to_string(), id.to_string()]);
        assert_eq!(ids.parent_params(1), vec!["all".to_string()]);
    }
}
