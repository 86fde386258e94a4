//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum app with a single fallback handler feeding the router
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Adapt axum requests into [`Request`] and [`Response`] back into axum
//! - Bind server to listener, shut down gracefully on Ctrl+C
//!
//! # Design Decisions
//! - Dispatch is synchronous; it runs on the blocking pool so database work
//!   never stalls the async workers
//! - Bodies are buffered up to the configured limit before dispatch

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json, Router as AxumRouter,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::http::Request;
use crate::observability::metrics;
use crate::routing::Router;

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub max_body_size: usize,
}

/// HTTP server for the storefront.
pub struct HttpServer {
    app: AxumRouter,
}

impl HttpServer {
    /// Create a new HTTP server dispatching into `router`.
    pub fn new(config: &AppConfig, router: Router) -> Self {
        let state = AppState {
            router: Arc::new(router),
            max_body_size: config.security.max_body_size,
        };
        Self {
            app: Self::build_app(config, state),
        }
    }

    /// Build the Axum app with all middleware layers.
    #[allow(deprecated)]
    fn build_app(config: &AppConfig, state: AppState) -> AxumRouter {
        let max_body_size = state.max_body_size;
        AxumRouter::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                    .layer(RequestBodyLimitLayer::new(max_body_size)),
            )
    }

    /// The configured Axum app, for embedding or driving in tests.
    pub fn app(&self) -> AxumRouter {
        self.app.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Adapt the axum request, dispatch it, and render the outcome.
async fn dispatch_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();

    let bytes = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(method = %method, path = %parts.uri.path(), error = %err, "Request body rejected");
            metrics::record_dispatch(&method, StatusCode::PAYLOAD_TOO_LARGE.as_u16(), start);
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "request body too large" })),
            )
                .into_response();
        }
    };

    let request = Request::from_parts(parts, bytes);
    let router = state.router.clone();
    let outcome = tokio::task::spawn_blocking(move || router.dispatch(&request)).await;

    let response = match outcome {
        Ok(Ok(response)) => response.into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(err) => {
            tracing::error!(method = %method, error = %err, "Dispatch task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal Server Error" })),
            )
                .into_response()
        }
    };

    metrics::record_dispatch(&method, response.status().as_u16(), start);
    response
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl+C; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
