//! Postgres advisory lock helper used to serialize cold-start schema migrations
//! across multiple server processes deploying against the same schema (§4.1, §5).

use sqlx::{PgConnection, Result};

pub async fn acquire(conn: &mut PgConnection, key: i64) -> Result<()> {
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(key)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn release(conn: &mut PgConnection, key: i64) -> Result<()> {
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(key)
        .execute(conn)
        .await?;
    Ok(())
}

/// Run `f` with the advisory lock held, releasing it (best-effort) even if `f`
/// fails, so a panicking or erroring migration never leaves the schema wedged. `f`'s
/// error type only needs to be constructible from a `sqlx::Error`, so callers that
/// wrap sqlx errors in their own error enum don't need a manual `acquire`/`release`.
pub async fn with_lock<F, T, E>(conn: &mut PgConnection, key: i64, f: F) -> std::result::Result<T, E>
where
    F: for<'a> FnOnce(
        &'a mut PgConnection,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send + 'a>>,
    E: From<sqlx::Error>,
{
    acquire(conn, key).await?;
    let result = f(conn).await;
    let _ = release(conn, key).await;
    result
}
