//! `/kurbisio/health` reporting (§4.9, §6): `{failed, failing, overdue, details?}`.

use super::backoff::OVERDUE_THRESHOLD_MINUTES;
use crate::error::KurbisioError;
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Terminal jobs (`attempts_left = 0`): exhausted all retries.
    pub failed: i64,
    /// Active jobs that have been retried at least once.
    pub failing: i64,
    /// Active jobs whose effective due time is more than ten minutes in the past.
    pub overdue: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<JobSummary>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobSummary {
    pub serial: i64,
    pub job: String,
    pub r#type: String,
    pub resource: String,
    pub attempts_left: i32,
}

pub async fn report(pool: &PgPool, with_details: bool) -> Result<HealthReport, KurbisioError> {
    let failed: i64 = sqlx::query_scalar("SELECT count(*) FROM \"_job_\" WHERE attempts_left = 0")
        .fetch_one(pool)
        .await?;

    let failing: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM \"_job_\" WHERE attempts_left > 0 AND attempts_left < 4",
    )
    .fetch_one(pool)
    .await?;

    let overdue: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM \"_job_\" WHERE attempts_left > 0 \
         AND COALESCE(scheduled_at, timestamp) < now() - ($1 || ' minutes')::interval",
    )
    .bind(OVERDUE_THRESHOLD_MINUTES.to_string())
    .fetch_one(pool)
    .await?;

    let details = if with_details {
        Some(
            sqlx::query_as::<_, JobSummary>(
                "SELECT serial, job, type, resource, attempts_left FROM \"_job_\" \
                 WHERE attempts_left = 0 OR attempts_left < 4 ORDER BY serial LIMIT 500",
            )
            .fetch_all(pool)
            .await?,
        )
    } else {
        None
    };

    Ok(HealthReport {
        failed,
        failing,
        overdue,
        details,
    })
}

/// `PUT /kurbisio/health/purge` (admin-only): deletes terminal (failed) jobs so
/// they stop showing up in health reports.
pub async fn purge_failed(pool: &PgPool) -> Result<u64, KurbisioError> {
    let result = sqlx::query("DELETE FROM \"_job_\" WHERE attempts_left = 0")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
