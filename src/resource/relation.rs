//! Relation handlers (C7, §4.7): n:m join tables between two collections.
//!
//! Each [`crate::model::config_doc::Relation`] registers two virtual collections,
//! `<left>/<right>` and `<right>/<left>`, that reuse the *target* collection's row
//! shape but restrict it to ids reachable through the join table. Rather than
//! threading an injected sub-predicate through [`super::collection::CollectionHandler::list`],
//! each [`RelationSide`] builds its own small query directly against the join table
//! plus the target table — the join predicate has no equivalent in the per-resource
//! [`crate::query::QueryTemplates`], which only ever models a single table's own
//! parent chain.

use super::row_to_json;
use crate::auth::{Actor, AuthContext};
use crate::error::KurbisioError;
use crate::model::config_doc::Operation;
use crate::pagination::ListQuery;
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// One direction of a relation: listing/reading/creating/deleting `target` rows
/// reachable from a fixed `own_id` through the join table.
pub struct RelationSide {
    pub join_table: String,
    pub own_column: String,
    pub target_column: String,
    pub target_table: String,
    pub permits: Vec<crate::model::config_doc::Permit>,
}

impl RelationSide {
    /// `?idonly=true[&withtimestamp=true]`: a flat list of the opposite side's ids,
    /// capped at 1000 rows to keep the plan linear (§4.7).
    pub async fn list_ids(
        &self,
        pool: &PgPool,
        own_id: Uuid,
        ctx: &AuthContext,
        with_timestamp: bool,
    ) -> Result<Vec<Value>, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::List, &self.permits)
            .check_scoped(&[(self.own_column.as_str(), own_id.to_string())])?;

        let cols = if with_timestamp {
            format!("{}, timestamp", self.target_column)
        } else {
            self.target_column.clone()
        };
        let sql = format!(
            "SELECT {cols} FROM \"{}\" WHERE {}=$1 ORDER BY timestamp DESC LIMIT 1000",
            self.join_table, self.own_column
        );
        let rows = sqlx::query(&sql).bind(own_id).fetch_all(pool).await?;
        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get(self.target_column.as_str())?;
                if with_timestamp {
                    let ts: chrono::DateTime<chrono::Utc> = row.try_get("timestamp")?;
                    Ok(json!({ "id": id, "timestamp": ts.to_rfc3339() }))
                } else {
                    Ok(Value::String(id.to_string()))
                }
            })
            .collect()
    }

    /// Full target rows reachable through the join table, paginated (§4.7).
    pub async fn list(
        &self,
        pool: &PgPool,
        own_id: Uuid,
        ctx: &AuthContext,
        query: &ListQuery,
    ) -> Result<Vec<Value>, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::List, &self.permits)
            .check_scoped(&[(self.own_column.as_str(), own_id.to_string())])?;

        let order = match query.order {
            crate::pagination::Order::Asc => "ASC",
            crate::pagination::Order::Desc => "DESC",
        };
        let sql = format!(
            "SELECT t.* FROM \"{target}\" t \
             WHERE t.{target_col} IN (SELECT {target_col} FROM \"{join}\" WHERE {own_col}=$1 LIMIT 1000) \
             ORDER BY t.timestamp {order} LIMIT $2 OFFSET $3",
            target = self.target_table,
            target_col = self.target_column,
            join = self.join_table,
            own_col = self.own_column,
        );
        let rows = sqlx::query(&sql)
            .bind(own_id)
            .bind(query.limit as i64)
            .bind(query.offset() as i64)
            .fetch_all(pool)
            .await?;
        rows.iter().map(row_to_json).collect()
    }

    /// Idempotent creation: a unique-violation on the join tuple resolves to a
    /// no-op rather than an error (§4.7). Returns whether a row was actually
    /// inserted, so the caller can tell a fresh creation (201) from a repeat (204).
    pub async fn create(
        &self,
        pool: &PgPool,
        own_id: Uuid,
        target_id: Uuid,
        ctx: &AuthContext,
    ) -> Result<bool, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Create, &self.permits)
            .check_scoped(&[(self.own_column.as_str(), own_id.to_string())])?;

        let sql = format!(
            "INSERT INTO \"{}\" ({}, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            self.join_table, self.own_column, self.target_column
        );
        let result = sqlx::query(&sql)
            .bind(own_id)
            .bind(target_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(
        &self,
        pool: &PgPool,
        own_id: Uuid,
        target_id: Uuid,
        ctx: &AuthContext,
    ) -> Result<(), KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Delete, &self.permits)
            .check_scoped(&[(self.own_column.as_str(), own_id.to_string())])?;

        let sql = format!(
            "DELETE FROM \"{}\" WHERE {}=$1 AND {}=$2",
            self.join_table, self.own_column, self.target_column
        );
        let result = sqlx::query(&sql)
            .bind(own_id)
            .bind(target_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(KurbisioError::NotFound);
        }
        Ok(())
    }

    pub async fn read(
        &self,
        pool: &PgPool,
        own_id: Uuid,
        target_id: Uuid,
        ctx: &AuthContext,
    ) -> Result<Value, KurbisioError> {
        Actor::new(ctx)
            .can(Operation::Read, &self.permits)
            .check_scoped(&[(self.own_column.as_str(), own_id.to_string())])?;

        let sql = format!(
            "SELECT t.* FROM \"{target}\" t \
             JOIN \"{join}\" j ON j.{target_col} = t.{target_col} \
             WHERE j.{own_col}=$1 AND j.{target_col}=$2",
            target = self.target_table,
            join = self.join_table,
            target_col = self.target_column,
            own_col = self.own_column,
        );
        let row = sqlx::query(&sql)
            .bind(own_id)
            .bind(target_id)
            .fetch_optional(pool)
            .await?
            .ok_or(KurbisioError::NotFound)?;
        row_to_json(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side() -> RelationSide {
        RelationSide {
            join_table: "users_devices".to_string(),
            own_column: "user_id".to_string(),
            target_column: "device_id".to_string(),
            target_table: "devices".to_string(),
            permits: vec![crate::model::config_doc::Permit {
                role: "everybody".to_string(),
                operations: vec![Operation::List, Operation::Create, Operation::Delete, Operation::Read],
                selectors: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn unauthorized_caller_is_denied_before_any_query() {
        let s = RelationSide {
            permits: vec![],
            ..side()
        };
        let ctx = AuthContext::default();
        // No pool is touched because the permit check happens first; use a
        // deliberately-invalid connection string to prove that.
        let pool = PgPool::connect_lazy("postgres://invalid/invalid").unwrap();
        let err = s
            .list(&pool, Uuid::nil(), &ctx, &ListQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KurbisioError::Authz(_)));
    }
}
