//! HTTP kernel tests driving the axum app directly.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::server_app;
use storefront::config::AppConfig;

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_and_request_id() {
    let app = server_app(&AppConfig::default());
    let (status, headers, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_json_round_trip() {
    let app = server_app(&AppConfig::default());

    let create = Request::builder()
        .method(Method::POST)
        .uri("/api/products")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": "Lamp", "price": 9.5 }).to_string()))
        .unwrap();
    let (status, headers, body) = send(app.clone(), create).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers[header::LOCATION], "/api/products/1");
    assert_eq!(body["name"], json!("Lamp"));

    let (status, _, body) = send(app, get("/api/products/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], json!(9.5));
}

#[tokio::test]
async fn test_form_body() {
    let app = server_app(&AppConfig::default());
    let create = Request::builder()
        .method(Method::POST)
        .uri("/api/products")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=Desk&stock=4&active=off"))
        .unwrap();

    let (status, _, body) = send(app, create).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["stock"], json!(4));
    assert_eq!(body["active"], json!(false));
}

#[tokio::test]
async fn test_error_statuses() {
    let app = server_app(&AppConfig::default());

    let (status, _, body) = send(app.clone(), get("/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("/nowhere"));

    let delete_health = Request::builder()
        .method(Method::DELETE)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(app.clone(), delete_health).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers[header::ALLOW], "GET");

    let (status, _, _) = send(app.clone(), get("/api/products?per_page=lots")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(app, get("/api/products/404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_head_served_by_get_route() {
    let app = server_app(&AppConfig::default());
    let head = Request::builder()
        .method(Method::HEAD)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(head).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_body_limit() {
    let mut config = AppConfig::default();
    config.security.max_body_size = 16;
    let app = server_app(&config);

    let oversized = Request::builder()
        .method(Method::POST)
        .uri("/api/products")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": "x".repeat(64) }).to_string()))
        .unwrap();
    let (status, _, _) = send(app, oversized).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
