//! Request-body gzip decoding (§4.4.3: "decode body (gzip-decode if
//! `Content-Encoding: gzip`)"). CORS and response compression are handled by
//! `tower_http` layers directly in [`super::app::build_router`]; only the
//! request-decode half needs a handwritten middleware, since `tower_http`'s
//! `RequestDecompressionLayer` applies to every route uniformly and this system
//! only ever gzip-decodes JSON/blob bodies on mutation routes.

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::header::CONTENT_ENCODING,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::io::Read;

const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub async fn decode_gzip_body(request: Request, next: Next) -> Response {
    let is_gzip = request
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    if !is_gzip {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            return crate::error::KurbisioError::BadRequest(format!("failed to read body: {e}"))
                .into_response();
        }
    };

    let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
    let mut decoded = Vec::new();
    if let Err(e) = decoder.read_to_end(&mut decoded) {
        return crate::error::KurbisioError::BadRequest(format!("invalid gzip body: {e}"))
            .into_response();
    }

    parts.headers.remove(CONTENT_ENCODING);
    let request = Request::from_parts(parts, Body::from(decoded));
    next.run(request).await
}
