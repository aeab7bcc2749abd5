//! Crate-wide error taxonomy and its mapping onto HTTP status codes.
//!
//! Grounded on the teacher's `common/auth/errors.rs` (`thiserror` enum with `#[from]`
//! conversions, one variant per failure class).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum KurbisioError {
    /// Raised while building the engine from a declarative configuration. Treated as
    /// fatal by the binary entry point; never constructed on the request hot path.
    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("authorization error: {0}")]
    Authz(String),

    #[error("not found")]
    NotFound,

    #[error("external index conflict")]
    ConflictIndex,

    #[error("revision mismatch")]
    ConflictRevision(serde_json::Value),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("interceptor rejected the request: {0}")]
    Interceptor(String),

    #[error("storage error {tag}: {source}")]
    Storage {
        tag: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Never surfaced to HTTP; consumed internally by the job dispatch loop to
    /// decrement `attempts_left` and schedule a retry.
    #[error("job handler error: {0}")]
    JobHandler(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KurbisioError {
    /// Wrap a lower-level error as a tagged, non-leaking storage error. The tag is
    /// logged in full and returned to the caller so operators can grep for it.
    pub fn storage(tag: u32, source: impl Into<anyhow::Error>) -> Self {
        Self::Storage {
            tag,
            source: source.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            KurbisioError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            KurbisioError::Validation(_) => StatusCode::BAD_REQUEST,
            KurbisioError::Authz(_) => StatusCode::UNAUTHORIZED,
            KurbisioError::NotFound => StatusCode::NOT_FOUND,
            KurbisioError::ConflictIndex | KurbisioError::ConflictRevision(_) => {
                StatusCode::CONFLICT
            }
            KurbisioError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            KurbisioError::Interceptor(_) => StatusCode::BAD_REQUEST,
            KurbisioError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            KurbisioError::JobHandler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            KurbisioError::BadRequest(_) => StatusCode::BAD_REQUEST,
            KurbisioError::Sqlx(e) => map_sqlx_status(e),
            KurbisioError::Json(_) => StatusCode::BAD_REQUEST,
            KurbisioError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Translate raw Postgres error codes per §4.4.3: `23505` unique violation → 409,
/// `23502` not-null violation → 422, `23503` foreign key violation → 404.
fn map_sqlx_status(err: &sqlx::Error) -> StatusCode {
    if let sqlx::Error::Database(db_err) = err {
        match db_err.code().as_deref() {
            Some("23505") => return StatusCode::CONFLICT,
            Some("23502") => return StatusCode::UNPROCESSABLE_ENTITY,
            Some("23503") => return StatusCode::NOT_FOUND,
            _ => {}
        }
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

impl IntoResponse for KurbisioError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            KurbisioError::ConflictRevision(current) => {
                (status, Json(current.clone())).into_response()
            }
            KurbisioError::Storage { tag, source } => {
                tracing::error!(tag, error = %source, "storage error");
                (status, Json(json!({ "error": format!("Error {tag:04}") }))).into_response()
            }
            other => {
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %other, "internal error");
                }
                (status, Json(json!({ "error": other.to_string() }))).into_response()
            }
        }
    }
}
