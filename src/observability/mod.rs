//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Routing, data access and the HTTP kernel produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields, never interpolated messages
//! - Request ID set by the HTTP layer and carried in the trace span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
