//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower-http layers, body buffering)
//!     → request.rs (method, path, query, headers, JSON / form body)
//!     → routing::Router::dispatch
//!     → response.rs (status, headers, text / JSON body; errors → status codes)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::Request;
pub use response::{Body, Response};
pub use server::HttpServer;
