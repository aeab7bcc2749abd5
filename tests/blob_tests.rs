//! Blob write create-vs-update status codes, header-mapped metadata, and
//! meta-only listing (§4.6).
//!
//! Requires Docker (a Postgres container); run with `cargo test -- --ignored`.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

#[tokio::test]
#[ignore]
async fn first_write_is_201_a_replace_is_200_and_headers_round_trip() {
    let h = TestHarness::new().await.unwrap();
    let (_status, _headers, user) = h
        .admin_request(
            "POST",
            "/users",
            Some(json!({"identity": "blob-owner@example.com", "name": "Blobby"})),
        )
        .await;
    let user_id = user["user_id"].as_str().unwrap();
    let blob_id = uuid::Uuid::new_v4();
    let uri = format!("/users/{user_id}/avatar/{blob_id}");

    let (status, ..) = h
        .admin_raw_request(
            "PUT",
            &uri,
            b"first-bytes".to_vec(),
            &[("content-type", "image/png")],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, headers, body) = h.admin_raw_request("GET", &uri, Vec::new(), &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/png");
    assert_eq!(&body[..], b"first-bytes");

    let (status, ..) = h
        .admin_raw_request(
            "PUT",
            &uri,
            b"replaced-bytes".to_vec(),
            &[("content-type", "image/jpeg")],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "replacing an existing blob must not re-announce 201");

    let (_status, headers, body) = h.admin_raw_request("GET", &uri, Vec::new(), &[]).await;
    assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
    assert_eq!(&body[..], b"replaced-bytes");
}

#[tokio::test]
#[ignore]
async fn deleting_a_blob_then_reading_it_is_not_found() {
    let h = TestHarness::new().await.unwrap();
    let (_status, _headers, user) = h
        .admin_request(
            "POST",
            "/users",
            Some(json!({"identity": "blob-del@example.com", "name": "B"})),
        )
        .await;
    let user_id = user["user_id"].as_str().unwrap();
    let blob_id = uuid::Uuid::new_v4();
    let uri = format!("/users/{user_id}/avatar/{blob_id}");

    h.admin_raw_request("PUT", &uri, b"bytes".to_vec(), &[("content-type", "image/png")])
        .await;

    let (status, ..) = h.admin_raw_request("DELETE", &uri, Vec::new(), &[]).await;
    assert_eq!(status, StatusCode::OK);

    let (status, ..) = h.admin_raw_request("GET", &uri, Vec::new(), &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn blob_etag_short_circuits_an_unchanged_read_and_changes_on_replace() {
    let h = TestHarness::new().await.unwrap();
    let (_status, _headers, user) = h
        .admin_request(
            "POST",
            "/users",
            Some(json!({"identity": "blob-etag@example.com", "name": "B"})),
        )
        .await;
    let user_id = user["user_id"].as_str().unwrap();
    let blob_id = uuid::Uuid::new_v4();
    let uri = format!("/users/{user_id}/avatar/{blob_id}");

    h.admin_raw_request("PUT", &uri, b"bytes".to_vec(), &[("content-type", "image/png")])
        .await;

    let (status, headers, _body) = h.admin_raw_request("GET", &uri, Vec::new(), &[]).await;
    assert_eq!(status, StatusCode::OK);
    let etag = headers.get("etag").expect("blob read must carry an etag").clone();

    let (status, headers, body) = h
        .admin_raw_request(
            "GET",
            &uri,
            Vec::new(),
            &[("if-none-match", etag.to_str().unwrap())],
        )
        .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert_eq!(headers.get("etag"), Some(&etag));
    assert!(body.is_empty(), "304 must not carry a body");

    h.admin_raw_request("PUT", &uri, b"replaced".to_vec(), &[("content-type", "image/png")])
        .await;

    let (status, headers, _body) = h
        .admin_raw_request(
            "GET",
            &uri,
            Vec::new(),
            &[("if-none-match", etag.to_str().unwrap())],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "replacing the blob must invalidate the old etag");
    assert_ne!(headers.get("etag"), Some(&etag));
}

#[tokio::test]
#[ignore]
async fn meta_listing_is_paginated_like_a_collection() {
    let h = TestHarness::new().await.unwrap();
    let (_status, _headers, user) = h
        .admin_request(
            "POST",
            "/users",
            Some(json!({"identity": "blob-list@example.com", "name": "B"})),
        )
        .await;
    let user_id = user["user_id"].as_str().unwrap();

    for i in 0..3 {
        let blob_id = uuid::Uuid::new_v4();
        h.admin_raw_request(
            "PUT",
            &format!("/users/{user_id}/avatar/{blob_id}"),
            format!("bytes-{i}").into_bytes(),
            &[("content-type", "image/png")],
        )
        .await;
    }

    let (status, headers, body) = h
        .admin_request("GET", &format!("/users/{user_id}/avatar?limit=2"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("pagination-total-count").unwrap(), "3");
    assert_eq!(headers.get("pagination-limit").unwrap(), "2");
    assert_eq!(body.as_array().unwrap().len(), 2, "limit must cap the page size");

    let (status, headers, body) = h
        .admin_request("GET", &format!("/users/{user_id}/avatar?limit=2&page=2"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("pagination-current-page").unwrap(), "2");
    assert_eq!(body.as_array().unwrap().len(), 1, "the second page holds the remainder");
}
