//! The generic path dispatcher (§4.4-§4.8) plus the built-in routes (§6): every
//! configured collection, singleton, blob, relation and shortcut is served by one
//! handler that resolves the request path against [`crate::resource::registry::ResourceRegistry`]
//! rather than a per-resource `axum::Router::route` registration, since the set of
//! routes is only known once the declarative configuration document is parsed.

use crate::auth::AuthContext;
use crate::engine::Engine;
use crate::error::KurbisioError;
use crate::etag::{etag_for_body, etag_for_listing, if_none_match_matches};
use crate::model::config_doc::ResourceKind;
use crate::pagination::parse_list_query;
use crate::query::Identifier;
use crate::resource::blob::{column_to_header, META_DATA_HEADER};
use crate::resource::collection::PathIds;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::IF_NONE_MATCH, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

pub fn build_routes() -> Router<Arc<Engine>> {
    Router::new()
        .route("/version", get(version_handler))
        .route("/authorization", get(authorization_handler))
        .route("/kurbisio/health", get(health_handler))
        .route("/kurbisio/health/purge", put(health_purge_handler))
        .route("/kurbisio/health/details", get(health_details_handler))
        .route("/kurbisio/events/:event", put(raise_event_handler))
        .fallback(dispatch)
}

async fn version_handler() -> Response {
    json_response(StatusCode::OK, &json!({ "version": env!("CARGO_PKG_VERSION") }), vec![])
}

/// `/authorization` (§6): surfaces the caller's resolved roles/selectors, letting
/// a client introspect what the capability oracle granted it.
async fn authorization_handler(State(engine): State<Arc<Engine>>, headers: HeaderMap) -> Response {
    match engine.authorizer.authorize_request(&headers).await {
        Ok(ctx) => json_response(
            StatusCode::OK,
            &json!({ "roles": ctx.roles, "selectors": ctx.selectors }),
            vec![],
        ),
        Err(e) => e.into_response(),
    }
}

fn require_admin(ctx: &AuthContext) -> Result<(), KurbisioError> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(KurbisioError::Authz("admin role required".to_string()))
    }
}

async fn health_handler(State(engine): State<Arc<Engine>>, headers: HeaderMap) -> Response {
    let ctx = match engine.authorizer.authorize_request(&headers).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = require_admin(&ctx) {
        return e.into_response();
    }
    match crate::jobs::health::report(&engine.pool, false).await {
        Ok(report) => json_response(StatusCode::OK, &json!(report), vec![]),
        Err(e) => e.into_response(),
    }
}

async fn health_details_handler(State(engine): State<Arc<Engine>>, headers: HeaderMap) -> Response {
    match engine.authorizer.authorize_request(&headers).await {
        Ok(ctx) => {
            if let Err(e) = require_admin(&ctx) {
                return e.into_response();
            }
            match crate::jobs::health::report(&engine.pool, true).await {
                Ok(report) => json_response(StatusCode::OK, &json!(report), vec![]),
                Err(e) => e.into_response(),
            }
        }
        Err(e) => e.into_response(),
    }
}

async fn health_purge_handler(State(engine): State<Arc<Engine>>, headers: HeaderMap) -> Response {
    match engine.authorizer.authorize_request(&headers).await {
        Ok(ctx) => {
            if let Err(e) = require_admin(&ctx) {
                return e.into_response();
            }
            match crate::jobs::health::purge_failed(&engine.pool).await {
                Ok(n) => json_response(StatusCode::OK, &json!({ "purged": n }), vec![]),
                Err(e) => e.into_response(),
            }
        }
        Err(e) => e.into_response(),
    }
}

/// `PUT /kurbisio/events/{event}` (admin-only): raise a user event by hand, body is
/// passed through as the job payload, `?key=`/`?resource=`/`?queued=true` select the
/// compression behavior (§4.9).
async fn raise_event_handler(
    State(engine): State<Arc<Engine>>,
    Path(event): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = match engine.authorizer.authorize_request(&headers).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = require_admin(&ctx) {
        return e.into_response();
    }
    let payload: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => return KurbisioError::Json(e).into_response(),
        }
    };
    match engine
        .job_store
        .raise_event(&event, "", "kurbisio/events", None, payload, Value::Null)
        .await
    {
        Ok(()) => {
            engine.job_pool.trigger();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Everything the generic dispatcher resolved about one request before invoking a
/// handler: the matched resource path, the parsed path identifiers, and whatever
/// segments remained after the identifiers (a property name/value pair, or `log`).
struct Match {
    resource: String,
    parent_ids: Vec<Identifier>,
    leaf: Option<Identifier>,
    trailing: Vec<String>,
}

/// Try to align `segments` against `resource`'s literal path segments, consuming one
/// identifier segment after every non-final literal segment (§4.4 table: `/a/{id}/b`).
fn match_resource(resource: &str, segments: &[String]) -> Option<Match> {
    let rsegs: Vec<&str> = resource.split('/').collect();
    let mut idx = 0;
    let mut parent_ids = Vec::new();

    for (i, rseg) in rsegs.iter().enumerate() {
        if segments.get(idx).map(String::as_str) != Some(*rseg) {
            return None;
        }
        idx += 1;
        if i + 1 < rsegs.len() {
            let id = segments.get(idx)?.parse::<Identifier>().ok()?;
            parent_ids.push(id);
            idx += 1;
        }
    }

    let leaf = segments.get(idx).and_then(|s| s.parse::<Identifier>().ok());
    if leaf.is_some() {
        idx += 1;
    }
    let trailing = segments[idx..].to_vec();

    Some(Match {
        resource: resource.to_string(),
        parent_ids,
        leaf,
        trailing,
    })
}

fn best_match<'a>(candidates: impl Iterator<Item = &'a String>, segments: &[String]) -> Option<Match> {
    candidates
        .filter_map(|r| match_resource(r, segments))
        .max_by_key(|m| m.resource.matches('/').count())
}

/// The single fallback handler backing every configured resource (§4.4-§4.8).
async fn dispatch(
    State(engine): State<Arc<Engine>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut segments: Vec<String> = uri
        .path()
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if segments.is_empty() {
        return KurbisioError::NotFound.into_response();
    }

    let ctx = match engine.authorizer.authorize_request(&headers).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    if let Some(shortcut) = engine.registry.shortcut(&segments[0]) {
        let resolved = match crate::resource::shortcut::resolve(shortcut, &ctx) {
            Ok(r) => r,
            Err(e) => return e.into_response(),
        };
        let mut new_segments: Vec<String> =
            resolved.split('/').filter(|s| !s.is_empty()).map(String::from).collect();
        new_segments.extend(segments.into_iter().skip(1));
        segments = new_segments;
    }

    let query = parse_query_string(uri.query().unwrap_or(""));

    if let Some(m) = best_match(engine.registry.collections.keys(), &segments) {
        return dispatch_collection(&engine, &method, &ctx, m, &query, &headers, body).await;
    }
    if let Some(m) = best_match(engine.registry.blobs.keys(), &segments) {
        return dispatch_blob(&engine, &method, &ctx, m, &headers, &query, body).await;
    }
    if let Some(m) = best_match(engine.registry.relations.keys(), &segments) {
        return dispatch_relation(&engine, &method, &ctx, m, &query).await;
    }

    KurbisioError::NotFound.into_response()
}

fn full_ids(m: &Match) -> PathIds {
    let mut ids = m.parent_ids.clone();
    if let Some(leaf) = m.leaf {
        ids.push(leaf);
    }
    PathIds(ids)
}

fn bool_flag(query: &HashMap<String, Vec<String>>, key: &str) -> bool {
    query
        .get(key)
        .and_then(|v| v.first())
        .map(|v| v == "true")
        .unwrap_or(false)
}

async fn dispatch_collection(
    engine: &Engine,
    method: &Method,
    ctx: &AuthContext,
    m: Match,
    query: &HashMap<String, Vec<String>>,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let Some(handler) = engine.registry.collection(&m.resource) else {
        return KurbisioError::NotFound.into_response();
    };

    let nointercept = bool_flag(query, "nointercept");
    let silent = bool_flag(query, "silent");
    let force = bool_flag(query, "force");

    let is_property_update = m.trailing.len() == 2 && m.leaf.is_some() && *method == Method::PUT;
    let is_log_get = m.trailing == ["log"] && m.leaf.is_some() && *method == Method::GET;
    if !m.trailing.is_empty() && !is_property_update && !is_log_get {
        // Other trailing segments beyond a property update or `/log` are not
        // served by the generic dispatcher.
        return KurbisioError::NotFound.into_response();
    }

    if is_log_get {
        let searchable = &handler.config.searchable_properties;
        let list_query = match parse_list_query(query, searchable) {
            Ok(q) => q,
            Err(e) => return e.into_response(),
        };
        return match handler.list_log(&full_ids(&m), ctx, &list_query).await {
            Ok((items, pagination)) => respond_list(headers, &Value::Array(items), pagination),
            Err(e) => e.into_response(),
        };
    }

    // §4.5: a singleton has no leaf id of its own — the last parent segment already
    // identifies the one row, so `read`/`upsert`/`delete` take the parent chain as-is
    // rather than the nested-collection leaf/list split below.
    if handler.kind == ResourceKind::Singleton {
        let ids = PathIds(m.parent_ids.clone());
        return match *method {
            Method::GET => match handler.read(&ids, ctx, nointercept).await {
                Ok(Some(value)) => etag_response(headers, &value),
                Ok(None) => StatusCode::NO_CONTENT.into_response(),
                Err(e) => e.into_response(),
            },
            Method::PUT | Method::PATCH => {
                let body: Value = match parse_json_body(&body) {
                    Ok(v) => v,
                    Err(e) => return e.into_response(),
                };
                let is_patch = *method == Method::PATCH;
                match handler.upsert(&ids, ctx, body, is_patch, force, silent).await {
                    Ok((row, true)) => json_response(StatusCode::CREATED, &row, vec![]),
                    Ok((row, false)) => json_response(StatusCode::OK, &row, vec![]),
                    Err(e) => e.into_response(),
                }
            }
            Method::DELETE => match handler.delete(&ids, ctx, silent).await {
                Ok(row) => json_response(StatusCode::OK, &row, vec![]),
                Err(e) => e.into_response(),
            },
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        };
    }

    // `/plural/{id}/<prop>/{value}`
    if m.trailing.len() == 2 && m.leaf.is_some() && method == Method::PUT {
        let prop = &m.trailing[0];
        let value = &m.trailing[1];
        return match handler.update_property(&full_ids(&m), ctx, prop, value, silent).await {
            Ok(row) => json_response(StatusCode::OK, &row, vec![]),
            Err(e) => e.into_response(),
        };
    }

    if m.leaf.is_some() {
        match *method {
            Method::GET => match handler.read(&full_ids(&m), ctx, nointercept).await {
                Ok(Some(value)) => etag_response(headers, &value),
                Ok(None) => StatusCode::NO_CONTENT.into_response(),
                Err(e) => e.into_response(),
            },
            Method::PUT | Method::PATCH => {
                let body: Value = match parse_json_body(&body) {
                    Ok(v) => v,
                    Err(e) => return e.into_response(),
                };
                let is_patch = *method == Method::PATCH;
                match handler.upsert(&full_ids(&m), ctx, body, is_patch, force, silent).await {
                    Ok((row, true)) => json_response(StatusCode::CREATED, &row, vec![]),
                    Ok((row, false)) => json_response(StatusCode::OK, &row, vec![]),
                    Err(e) => e.into_response(),
                }
            }
            Method::DELETE => match handler.delete(&full_ids(&m), ctx, silent).await {
                Ok(row) => json_response(StatusCode::OK, &row, vec![]),
                Err(e) => e.into_response(),
            },
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        }
    } else {
        let parent_ids = PathIds(m.parent_ids.clone());
        match *method {
            Method::GET => {
                let searchable = &handler.config.searchable_properties;
                let list_query = match parse_list_query(query, searchable) {
                    Ok(q) => q,
                    Err(e) => return e.into_response(),
                };
                match handler.list(&parent_ids, ctx, &list_query).await {
                    Ok((items, pagination)) => {
                        let body = Value::Array(items);
                        respond_list(headers, &body, pagination)
                    }
                    Err(e) => e.into_response(),
                }
            }
            Method::POST => {
                let body: Value = match parse_json_body(&body) {
                    Ok(v) => v,
                    Err(e) => return e.into_response(),
                };
                match handler.create(&parent_ids, None, ctx, body, force, silent).await {
                    Ok(row) => json_response(StatusCode::CREATED, &row, vec![]),
                    Err(e) => e.into_response(),
                }
            }
            Method::PUT | Method::PATCH => {
                let body: Value = match parse_json_body(&body) {
                    Ok(v) => v,
                    Err(e) => return e.into_response(),
                };
                let id = body
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<Identifier>().ok());
                let ids = PathIds({
                    let mut v = parent_ids.0.clone();
                    if let Some(id) = id {
                        v.push(id);
                    }
                    v
                });
                let is_patch = *method == Method::PATCH;
                match handler.upsert(&ids, ctx, body, is_patch, force, silent).await {
                    Ok((row, true)) => json_response(StatusCode::CREATED, &row, vec![]),
                    Ok((row, false)) => json_response(StatusCode::OK, &row, vec![]),
                    Err(e) => e.into_response(),
                }
            }
            Method::DELETE => match handler.clear(&parent_ids, ctx, silent).await {
                Ok(n) => json_response(StatusCode::OK, &json!({ "deleted": n }), vec![]),
                Err(e) => e.into_response(),
            },
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        }
    }
}

async fn dispatch_blob(
    engine: &Engine,
    method: &Method,
    ctx: &AuthContext,
    m: Match,
    headers: &HeaderMap,
    query: &HashMap<String, Vec<String>>,
    body: Bytes,
) -> Response {
    let Some(handler) = engine.registry.blob(&m.resource) else {
        return KurbisioError::NotFound.into_response();
    };
    let silent = bool_flag(query, "silent");

    if m.leaf.is_none() {
        return match *method {
            Method::GET => {
                let searchable = &handler.config.searchable_properties;
                let list_query = match parse_list_query(query, searchable) {
                    Ok(q) => q,
                    Err(e) => return e.into_response(),
                };
                match handler.list_meta(&PathIds(m.parent_ids.clone()), ctx, &list_query).await {
                    Ok((items, pagination)) => respond_list(headers, &Value::Array(items), pagination),
                    Err(e) => e.into_response(),
                }
            }
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        };
    }

    let ids = full_ids(&m);
    match *method {
        Method::GET => match handler.read(&ids, ctx).await {
            Ok(meta) => {
                let etag = blob_etag(&meta.body);
                if let Some(if_none_match) = headers.get(IF_NONE_MATCH) {
                    if if_none_match_matches(if_none_match, &etag) {
                        return not_modified_response(vec![(HeaderName::from_static("etag"), etag)]);
                    }
                }
                blob_response(&handler.config.static_properties, &meta.body, meta.blob, etag)
            }
            Err(e) => e.into_response(),
        },
        Method::PUT => {
            let Some(leaf) = m.leaf.and_then(|i| i.as_uuid()) else {
                return KurbisioError::BadRequest("blob id must be a uuid".to_string()).into_response();
            };
            let meta_data = headers
                .get(META_DATA_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| serde_json::from_str::<Value>(v).ok())
                .unwrap_or(json!({}));
            let header_map: HashMap<String, String> = headers
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
                .collect();
            match handler
                .write(
                    &PathIds(m.parent_ids.clone()),
                    leaf,
                    ctx,
                    &header_map,
                    meta_data,
                    body.to_vec(),
                    silent,
                )
                .await
            {
                Ok((row, true)) => json_response(StatusCode::CREATED, &row, vec![]),
                Ok((row, false)) => json_response(StatusCode::OK, &row, vec![]),
                Err(e) => e.into_response(),
            }
        }
        Method::DELETE => match handler.delete(&ids, ctx, silent).await {
            Ok(row) => json_response(StatusCode::OK, &row, vec![]),
            Err(e) => e.into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// §4.6: a mutable blob's `ETag` is derived from its `timestamp` rather than a hash
/// of the (potentially large) body, so a conditional `GET` never has to read the
/// blob bytes back out of Postgres just to tell whether they changed.
fn blob_etag(meta: &Value) -> String {
    let timestamp = meta.get("timestamp").and_then(Value::as_str).unwrap_or("");
    etag_for_body(timestamp.as_bytes())
}

fn blob_response(static_columns: &[String], meta: &Value, blob: Vec<u8>, etag: String) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("etag", etag);
    for column in static_columns {
        if let Some(v) = meta.get(column).and_then(Value::as_str) {
            let header = column_to_header(column);
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_str(&header),
                HeaderValue::from_str(v),
            ) {
                response = response.header(name, value);
            }
        }
    }
    response.body(axum::body::Body::from(blob)).unwrap().into_response()
}

async fn dispatch_relation(
    engine: &Engine,
    method: &Method,
    ctx: &AuthContext,
    m: Match,
    query: &HashMap<String, Vec<String>>,
) -> Response {
    let Some(side) = engine.registry.relation(&m.resource) else {
        return KurbisioError::NotFound.into_response();
    };
    let Some(own_id) = m.parent_ids.last().and_then(Identifier::as_uuid) else {
        return KurbisioError::BadRequest("relation requires an owning id".to_string()).into_response();
    };

    if let Some(target_id) = m.leaf.and_then(|i| i.as_uuid()) {
        return match *method {
            Method::GET => match side.read(&engine.pool, own_id, target_id, ctx).await {
                Ok(value) => json_response(StatusCode::OK, &value, vec![]),
                Err(e) => e.into_response(),
            },
            Method::PUT => match side.create(&engine.pool, own_id, target_id, ctx).await {
                Ok(true) => StatusCode::CREATED.into_response(),
                Ok(false) => StatusCode::NO_CONTENT.into_response(),
                Err(e) => e.into_response(),
            },
            Method::DELETE => match side.delete(&engine.pool, own_id, target_id, ctx).await {
                Ok(()) => StatusCode::NO_CONTENT.into_response(),
                Err(e) => e.into_response(),
            },
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        };
    }

    if *method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    if bool_flag(query, "idonly") {
        let with_timestamp = bool_flag(query, "withtimestamp");
        return match side.list_ids(&engine.pool, own_id, ctx, with_timestamp).await {
            Ok(ids) => json_response(StatusCode::OK, &Value::Array(ids), vec![]),
            Err(e) => e.into_response(),
        };
    }

    let list_query = parse_list_query(query, &[]).unwrap_or_default();
    match side.list(&engine.pool, own_id, ctx, &list_query).await {
        Ok(items) => json_response(StatusCode::OK, &Value::Array(items), vec![]),
        Err(e) => e.into_response(),
    }
}

fn parse_json_body(body: &[u8]) -> Result<Value, KurbisioError> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(KurbisioError::Json)
}

/// §4.4.1: a single-resource GET honors `If-None-Match` and always stamps its
/// own ETag on a 200 so a subsequent conditional GET can short-circuit.
fn etag_response(headers: &HeaderMap, value: &Value) -> Response {
    let serialized = serde_json::to_vec(value).unwrap_or_default();
    let etag = etag_for_body(&serialized);
    if let Some(if_none_match) = headers.get(IF_NONE_MATCH) {
        if if_none_match_matches(if_none_match, &etag) {
            return not_modified_response(vec![(HeaderName::from_static("etag"), etag)]);
        }
    }
    json_response(StatusCode::OK, value, vec![(HeaderName::from_static("etag"), etag)])
}

/// §4.4.2: a listing's ETag additionally binds the total count, so a page whose
/// body is unchanged but whose total grew (a sibling insert) still invalidates.
fn respond_list(headers: &HeaderMap, body: &Value, pagination: crate::pagination::PaginationHeaders) -> Response {
    let serialized = serde_json::to_vec(body).unwrap_or_default();
    let etag = etag_for_listing(&serialized, pagination.total_count);

    let mut response_headers = vec![
        (HeaderName::from_static("pagination-limit"), pagination.limit.to_string()),
        (HeaderName::from_static("pagination-total-count"), pagination.total_count.to_string()),
        (HeaderName::from_static("pagination-page-count"), pagination.page_count.to_string()),
        (HeaderName::from_static("pagination-current-page"), pagination.current_page.to_string()),
        (HeaderName::from_static("etag"), etag.clone()),
    ];
    if let Some(until) = pagination.until {
        response_headers.push((HeaderName::from_static("pagination-until"), until.to_rfc3339()));
    }

    if let Some(if_none_match) = headers.get(IF_NONE_MATCH) {
        if if_none_match_matches(if_none_match, &etag) {
            return not_modified_response(response_headers);
        }
    }
    json_response(StatusCode::OK, body, response_headers)
}

fn not_modified_response(extra_headers: Vec<(HeaderName, String)>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    for (name, value) in extra_headers {
        if let Ok(v) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, v);
        }
    }
    response
}

fn json_response(status: StatusCode, value: &Value, extra_headers: Vec<(HeaderName, String)>) -> Response {
    let mut response = (status, Json(value.clone())).into_response();
    for (name, value) in extra_headers {
        if let Ok(v) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, v);
        }
    }
    response
}

/// A small percent-decoding query-string parser (`k=v&k=v2`), since this system's
/// query parameters are simple tokens/timestamps/filters rather than full form data.
fn parse_query_string(raw: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(percent_decode(key))
            .or_default()
            .push(percent_decode(value));
    }
    params
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""), 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_nested_collection_with_parent_and_leaf() {
        let segs: Vec<String> = ["users", "11111111-1111-1111-1111-111111111111", "devices", "22222222-2222-2222-2222-222222222222"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let m = match_resource("users/devices", &segs).unwrap();
        assert_eq!(m.parent_ids.len(), 1);
        assert!(m.leaf.is_some());
        assert!(m.trailing.is_empty());
    }

    #[test]
    fn matches_root_collection_list_with_no_leaf() {
        let segs: Vec<String> = vec!["users".to_string()];
        let m = match_resource("users", &segs).unwrap();
        assert!(m.parent_ids.is_empty());
        assert!(m.leaf.is_none());
    }

    #[test]
    fn trailing_segments_carry_property_update() {
        let segs: Vec<String> = ["users", "11111111-1111-1111-1111-111111111111", "nickname", "Jo"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let m = match_resource("users", &segs).unwrap();
        assert_eq!(m.trailing, vec!["nickname".to_string(), "Jo".to_string()]);
    }

    #[test]
    fn mismatched_literal_segment_does_not_match() {
        let segs: Vec<String> = vec!["orders".to_string()];
        assert!(match_resource("users", &segs).is_none());
    }

    #[test]
    fn percent_decode_handles_plus_and_escapes() {
        assert_eq!(percent_decode("a+b%20c"), "a b c");
    }

    #[test]
    fn query_string_collects_repeated_keys() {
        let q = parse_query_string("filter=a=1&filter=b=2&limit=10");
        assert_eq!(q.get("filter").unwrap().len(), 2);
        assert_eq!(q.get("limit").unwrap()[0], "10");
    }
}
