//! Route middleware.
//!
//! A middleware sees the merged parameter set before the action runs. It may
//! replace the parameters handed to the rest of the chain, or return a
//! response without calling `next` at all.

use std::fmt;
use std::sync::Arc;

use crate::http::{Request, Response};
use crate::routing::coerce::ParameterSet;
use crate::routing::error::DispatchError;

type Endpoint<'a> = dyn Fn(ParameterSet) -> Result<Response, DispatchError> + 'a;

/// A handler inserted in front of a route action.
pub trait Middleware: Send + Sync {
    fn handle(
        &self,
        request: &Request,
        params: ParameterSet,
        next: Next<'_>,
    ) -> Result<Response, DispatchError>;
}

impl<F> Middleware for F
where
    F: Fn(&Request, ParameterSet, Next<'_>) -> Result<Response, DispatchError> + Send + Sync,
{
    fn handle(
        &self,
        request: &Request,
        params: ParameterSet,
        next: Next<'_>,
    ) -> Result<Response, DispatchError> {
        self(request, params, next)
    }
}

/// Wrap a closure as a shareable middleware.
pub fn from_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(&Request, ParameterSet, Next<'_>) -> Result<Response, DispatchError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// The remainder of the middleware chain, ending in the route action.
pub struct Next<'a> {
    request: &'a Request,
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a Endpoint<'a>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        request: &'a Request,
        chain: &'a [Arc<dyn Middleware>],
        endpoint: &'a Endpoint<'a>,
    ) -> Self {
        Self {
            request,
            chain,
            endpoint,
        }
    }

    /// Continue with `params`, running the remaining middleware in order.
    pub fn run(self, params: ParameterSet) -> Result<Response, DispatchError> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(
                self.request,
                params,
                Next {
                    request: self.request,
                    chain: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => (self.endpoint)(params),
        }
    }
}

/// How a route refers to a middleware: by instance or by container name.
#[derive(Clone)]
pub enum MiddlewareRef {
    Named(String),
    Instance(Arc<dyn Middleware>),
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

impl From<&str> for MiddlewareRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for MiddlewareRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareRef {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        Self::Instance(middleware)
    }
}

impl<M: Middleware + 'static> From<Arc<M>> for MiddlewareRef {
    fn from(middleware: Arc<M>) -> Self {
        Self::Instance(middleware)
    }
}
