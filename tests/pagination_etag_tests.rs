//! ETag stability and `If-None-Match` short-circuiting (§4.4.1, §4.4.2), and the
//! pagination invariant that paging through every page partitions the full set
//! with no overlap or drop.
//!
//! Requires Docker (a Postgres container); run with `cargo test -- --ignored`.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;
use std::collections::HashSet;

#[tokio::test]
#[ignore]
async fn single_resource_etag_is_stable_and_if_none_match_short_circuits() {
    let h = TestHarness::new().await.unwrap();
    let (_status, _headers, created) = h
        .admin_request(
            "POST",
            "/users",
            Some(json!({"identity": "etag@example.com", "name": "Eve"})),
        )
        .await;
    let user_id = created["user_id"].as_str().unwrap().to_string();

    let (status, headers_a, _body) = h
        .admin_request("GET", &format!("/users/{user_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let etag = headers_a.get("etag").expect("etag header present").clone();

    let (status, headers_b, _body) = h
        .admin_request("GET", &format!("/users/{user_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers_b.get("etag"), Some(&etag), "etag must be stable across unchanged reads");

    let (status, headers_c, body) = h
        .admin_request_with_headers(
            "GET",
            &format!("/users/{user_id}"),
            None,
            &[("if-none-match", etag.to_str().unwrap())],
        )
        .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert_eq!(headers_c.get("etag"), Some(&etag));
    assert_eq!(body, serde_json::Value::Null, "304 must not carry a body");

    h.admin_request(
        "PATCH",
        &format!("/users/{user_id}"),
        Some(json!({"name": "Eve II"})),
    )
    .await;

    let (status, headers_d, _body) = h
        .admin_request_with_headers(
            "GET",
            &format!("/users/{user_id}"),
            None,
            &[("if-none-match", etag.to_str().unwrap())],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "a changed row must invalidate the old etag");
    assert_ne!(headers_d.get("etag"), Some(&etag));
}

#[tokio::test]
#[ignore]
async fn listing_etag_binds_the_total_count_not_just_the_page_body() {
    let h = TestHarness::new().await.unwrap();
    for i in 0..3 {
        h.admin_request(
            "POST",
            "/devices",
            Some(json!({"name": format!("device-{i}")})),
        )
        .await;
    }

    let (status, headers_a, _body) = h
        .admin_request("GET", "/devices?limit=1", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let etag = headers_a.get("etag").expect("etag header present").clone();

    // A sibling insert changes the total count without changing this page's body.
    h.admin_request("POST", "/devices", Some(json!({"name": "device-extra"})))
        .await;

    let (status, headers_b, _body) = h
        .admin_request_with_headers(
            "GET",
            "/devices?limit=1",
            None,
            &[("if-none-match", etag.to_str().unwrap())],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "a grown total count must invalidate the listing etag");
    assert_ne!(headers_b.get("etag"), Some(&etag));
}

#[tokio::test]
#[ignore]
async fn paging_through_every_page_partitions_the_full_set() {
    let h = TestHarness::new().await.unwrap();
    const TOTAL: usize = 25;
    const LIMIT: usize = 10;

    let mut expected_ids = HashSet::new();
    for i in 0..TOTAL {
        let (_status, _headers, created) = h
            .admin_request(
                "POST",
                "/devices",
                Some(json!({"name": format!("paged-{i}")})),
            )
            .await;
        expected_ids.insert(created["device_id"].as_str().unwrap().to_string());
    }

    let mut seen_ids = HashSet::new();
    let page_count = TOTAL.div_ceil(LIMIT);
    for page in 1..=page_count {
        let (status, headers, body) = h
            .admin_request("GET", &format!("/devices?limit={LIMIT}&page={page}"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get("pagination-total-count").unwrap(),
            &TOTAL.to_string()
        );
        for item in body.as_array().unwrap() {
            let id = item["device_id"].as_str().unwrap().to_string();
            assert!(seen_ids.insert(id), "page {page} repeated an id already seen on an earlier page");
        }
    }
    assert_eq!(seen_ids, expected_ids, "paging through every page must cover exactly the full set");
}

#[tokio::test]
#[ignore]
async fn next_token_seeks_past_the_cursor_instead_of_repeating_a_page() {
    let h = TestHarness::new().await.unwrap();
    const TOTAL: usize = 7;
    const LIMIT: usize = 3;

    let mut expected_ids = HashSet::new();
    for i in 0..TOTAL {
        let (_status, _headers, created) = h
            .admin_request(
                "POST",
                "/devices",
                Some(json!({"name": format!("cursor-{i}")})),
            )
            .await;
        expected_ids.insert(created["device_id"].as_str().unwrap().to_string());
    }

    let mut seen_ids = HashSet::new();
    let mut next_token: Option<String> = None;
    loop {
        let uri = match &next_token {
            Some(token) => format!("/devices?limit={LIMIT}&next_token={token}"),
            None => format!("/devices?limit={LIMIT}"),
        };
        let (status, _headers, body) = h.admin_request("GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        if items.is_empty() {
            break;
        }
        for item in items {
            let id = item["device_id"].as_str().unwrap().to_string();
            assert!(seen_ids.insert(id), "a cursor page repeated an id already seen");
        }
        let last = items.last().unwrap();
        let timestamp = last["timestamp"].as_str().unwrap();
        let id = last["device_id"].as_str().unwrap();
        let encoded = kurbisio::cursor::Cursor::single(
            chrono::DateTime::parse_from_rfc3339(timestamp)
                .unwrap()
                .with_timezone(&chrono::Utc),
            uuid::Uuid::parse_str(id).unwrap(),
        )
        .encode();
        next_token = Some(encoded);
        if items.len() < LIMIT {
            break;
        }
    }
    assert_eq!(seen_ids, expected_ids, "seeking via next_token must cover exactly the full set");
}
