//! Router assembly: wires the generic dispatcher (§4.4-§4.8), the built-in routes
//! (§6), and the middleware stack (§4.4.3, §7) around one shared [`Engine`].
//!
//! Layer order mirrors the teacher's `server/app.rs` (CORS and tracing applied
//! outermost, request-shaping middleware closer to the handlers, `with_state` last).

use super::middleware::decode_gzip_body;
use super::routes::build_routes;
use crate::engine::Engine;
use axum::{error_handling::HandleErrorLayer, http::StatusCode, middleware, BoxError, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Assemble the full HTTP surface for `engine`. The caller is responsible for
/// starting the job worker pool (`engine.job_pool.spawn(..)`) separately, since
/// that lifecycle is independent of whether/how the router is served.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let error_layer = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_timeout_error))
        .timeout(Duration::from_secs(30));

    build_routes()
        .layer(middleware::from_fn(decode_gzip_body))
        .layer(error_layer)
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn handle_timeout_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled error: {err}"))
    }
}
