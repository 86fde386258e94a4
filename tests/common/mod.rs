//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use axum::http::{Method, Uri};
use serde_json::Value;

use storefront::config::AppConfig;
use storefront::routing::ParameterSet;
use storefront::{app, Cache, Database, HttpServer, Request, Router};

/// Request with no body.
pub fn request(method: Method, uri: &str) -> Request {
    let uri: Uri = uri.parse().expect("test uri");
    Request::new(method, uri)
}

/// Request with a JSON body.
pub fn json_request(method: Method, uri: &str, body: Value) -> Request {
    request(method, uri).with_json(&body)
}

/// JSON object literal as a parameter set.
pub fn params(value: Value) -> ParameterSet {
    value.as_object().cloned().expect("object literal")
}

/// Migrated in-memory database.
pub fn database() -> Database {
    let db = Database::in_memory().expect("in-memory database");
    app::migrate(&db).expect("schema");
    db
}

/// The storefront router over a fresh database.
pub fn storefront() -> (Router, Database) {
    let db = database();
    let router = app::build(db.clone(), Cache::new(Duration::from_secs(60))).expect("routes");
    (router, db)
}

/// The full axum app over a fresh database.
pub fn server_app(config: &AppConfig) -> axum::Router {
    let (router, _db) = storefront();
    HttpServer::new(config, router).app()
}
