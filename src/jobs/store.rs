//! Durable storage operations over the `_job_` table (§4.9).
//!
//! Grounded on the teacher's `kernel/jobs/job.rs::claim_jobs` (CTE + `FOR UPDATE
//! SKIP LOCKED` + `UPDATE … RETURNING`) and `queue.rs::mark_failed` (backoff
//! computation on claim), adapted to this system's compress-by-default event model
//! and commit-then-handle dispatch loop.

use super::backoff::next_scheduled_at;
use super::model::Job;
use crate::error::KurbisioError;
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a notification row in the same transaction as the mutation it
    /// reports, so delivery is at-least-once exactly when the mutation commits
    /// (§5 Transactions).
    pub async fn insert_notification(
        tx: &mut Transaction<'_, Postgres>,
        operation: &str,
        resource: &str,
        resource_id: Option<Uuid>,
        payload: Value,
    ) -> Result<(), KurbisioError> {
        sqlx::query(
            "INSERT INTO \"_job_\" (job, type, resource, resource_id, payload) \
             VALUES ('notification', $1, $2, $3, $4)",
        )
        .bind(operation)
        .bind(resource)
        .bind(resource_id)
        .bind(payload)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// `RaiseEvent`: always creates a new active row, compressing with any existing
    /// active row for the same `(type, key, resource, resource_id)` via the partial
    /// unique index (§4.9, property 9).
    pub async fn raise_event(
        &self,
        event_type: &str,
        key: &str,
        resource: &str,
        resource_id: Option<Uuid>,
        payload: Value,
        context: Value,
    ) -> Result<(), KurbisioError> {
        sqlx::query(
            "INSERT INTO \"_job_\" (job, type, key, resource, resource_id, payload, context) \
             VALUES ('event', $1, $2, $3, $4, $5, $6) \
             ON CONFLICT (type, key, resource, resource_id) WHERE job='event' AND attempts_left > 0 \
             DO UPDATE SET payload = EXCLUDED.payload, context = EXCLUDED.context, \
                           timestamp = now(), attempts_left = 4, scheduled_at = NULL",
        )
        .bind(event_type)
        .bind(key)
        .bind(resource)
        .bind(resource_id)
        .bind(payload)
        .bind(context)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `RaiseEventIfNotExist`: a no-op on the payload when an active row already
    /// exists; otherwise identical to [`Self::raise_event`].
    pub async fn raise_event_if_not_exist(
        &self,
        event_type: &str,
        key: &str,
        resource: &str,
        resource_id: Option<Uuid>,
        payload: Value,
        context: Value,
    ) -> Result<(), KurbisioError> {
        sqlx::query(
            "INSERT INTO \"_job_\" (job, type, key, resource, resource_id, payload, context) \
             VALUES ('event', $1, $2, $3, $4, $5, $6) \
             ON CONFLICT (type, key, resource, resource_id) WHERE job='event' AND attempts_left > 0 \
             DO UPDATE SET attempts_left = 4",
        )
        .bind(event_type)
        .bind(key)
        .bind(resource)
        .bind(resource_id)
        .bind(payload)
        .bind(context)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Queued events are never compressed: every call inserts a distinct row
    /// (property 10).
    pub async fn raise_queued_event(
        &self,
        event_type: &str,
        key: &str,
        resource: &str,
        resource_id: Option<Uuid>,
        payload: Value,
        context: Value,
    ) -> Result<(), KurbisioError> {
        sqlx::query(
            "INSERT INTO \"_job_\" (job, type, key, resource, resource_id, payload, context) \
             VALUES ('queued-event', $1, $2, $3, $4, $5, $6)",
        )
        .bind(event_type)
        .bind(key)
        .bind(resource)
        .bind(resource_id)
        .bind(payload)
        .bind(context)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes the active row if one exists, returning whether it did (property 12).
    pub async fn cancel_event(
        &self,
        event_type: &str,
        key: &str,
        resource: &str,
        resource_id: Option<Uuid>,
    ) -> Result<bool, KurbisioError> {
        let result = sqlx::query(
            "DELETE FROM \"_job_\" WHERE job='event' AND type=$1 AND key=$2 AND resource=$3 \
             AND resource_id IS NOT DISTINCT FROM $4 AND attempts_left > 0",
        )
        .bind(event_type)
        .bind(key)
        .bind(resource)
        .bind(resource_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn schedule_event(
        &self,
        event_type: &str,
        key: &str,
        resource: &str,
        resource_id: Option<Uuid>,
        scheduled_at: chrono::DateTime<Utc>,
    ) -> Result<(), KurbisioError> {
        sqlx::query(
            "UPDATE \"_job_\" SET scheduled_at = $1 WHERE job='event' AND type=$2 AND key=$3 \
             AND resource=$4 AND resource_id IS NOT DISTINCT FROM $5 AND attempts_left > 0",
        )
        .bind(scheduled_at)
        .bind(event_type)
        .bind(key)
        .bind(resource)
        .bind(resource_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The dispatch loop's claim step (§4.9 steps 1-4): atomically pick the oldest
    /// ready row, decrement its `attempts_left`, and set its next `scheduled_at`
    /// per the backoff table — all before the transaction commits, so the decrement
    /// persists even if the handler crashes afterward.
    pub async fn claim_next(&self) -> Result<Option<Job>, KurbisioError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let row = sqlx::query(
            "SELECT * FROM \"_job_\" WHERE attempts_left > 0 \
             AND (scheduled_at IS NULL OR scheduled_at <= $1) \
             ORDER BY serial FOR UPDATE SKIP LOCKED LIMIT 1",
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let job = Job::from_row(&row)?;
        let next_at = next_scheduled_at(job.attempts_left, now);

        let updated_row = sqlx::query(
            "UPDATE \"_job_\" SET attempts_left = attempts_left - 1, scheduled_at = $2 \
             WHERE serial = $1 RETURNING *",
        )
        .bind(job.serial)
        .bind(next_at)
        .fetch_one(&mut *tx)
        .await?;

        let claimed = Job::from_row(&updated_row)?;
        tx.commit().await?;
        Ok(Some(claimed))
    }

    /// §4.9 step 5: delete on success, guarded against a race with a concurrent
    /// requeue (`attempts_left < 4` means this claim's decrement is still the
    /// current state; a fresh compression re-raise would have reset it to 4).
    pub async fn mark_succeeded(&self, serial: i64) -> Result<bool, KurbisioError> {
        let result = sqlx::query(
            "DELETE FROM \"_job_\" WHERE serial = $1 AND attempts_left < 4 RETURNING serial",
        )
        .bind(serial)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    /// §4.9 step 6: on failure, nothing further is persisted — the decrement from
    /// [`Self::claim_next`] already stands.
    pub async fn mark_failed(&self, _serial: i64) -> Result<(), KurbisioError> {
        Ok(())
    }
}
