//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     get/post/.../any(template, action)
//!     → path.rs (template → anchored regex, constraints, optionals)
//!     → route.rs (methods, defaults, name, middleware)
//!     → router.rs (ordered registry)
//!
//! Dispatch:
//!     Request (method, path, query, body)
//!     → router.rs (first matching route, HEAD → GET fallback, 404 / 405)
//!     → route.rs (body > query > path > defaults)
//!     → middleware.rs (chain, may short-circuit)
//!     → action.rs + resolver.rs (handler or controller method)
//!     → coerce.rs (declared parameter types)
//!     → Response
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable at dispatch
//! - First registered match wins
//! - Handlers declare their parameters; nothing is discovered by reflection

pub mod action;
pub mod coerce;
pub mod error;
pub mod middleware;
pub mod path;
pub mod resolver;
pub mod route;
pub mod router;

pub use action::{Action, Controller, ControllerRef, Handler};
pub use coerce::{Arg, Args, ParamSpec, ParamType, ParameterSet};
pub use error::{CoercionError, DispatchError, RouteError};
pub use middleware::{from_fn, Middleware, MiddlewareRef, Next};
pub use resolver::{Container, Resolver};
pub use route::Route;
pub use router::Router;
