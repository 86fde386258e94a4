//! Storefront: routing, dispatch and data access for a small catalog service.

pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod http;
pub mod observability;
pub mod routing;

pub use cache::Cache;
pub use config::AppConfig;
pub use db::Database;
pub use http::{HttpServer, Request, Response};
pub use routing::Router;
