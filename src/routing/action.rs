//! Route actions.
//!
//! # Responsibilities
//! - Represent what a route invokes: a handler, a controller method bound to
//!   a class name or instance, or a `"Class@method"` string
//! - Resolve controllers through the injected resolver, then the container
//! - Bind and coerce arguments from the handler's parameter descriptors
//!
//! # Design Decisions
//! - Handlers declare their parameters at registration time; nothing is
//!   discovered at dispatch
//! - The action shape is matched once per dispatch, never inspected further

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::http::{Request, Response};
use crate::routing::coerce::{bind, Args, ParamSpec, ParamType, ParameterSet};
use crate::routing::error::DispatchError;
use crate::routing::resolver::Resolvers;

type HandlerFn = dyn Fn(Args) -> Result<Response, DispatchError> + Send + Sync;

/// A callable plus the description of its formal parameters.
#[derive(Clone)]
pub struct Handler {
    params: Vec<ParamSpec>,
    func: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Args) -> Result<Response, DispatchError> + Send + Sync + 'static,
    {
        Self {
            params: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// Declare a parameter with no default.
    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamSpec::new(name, ty));
        self
    }

    /// Declare a parameter with a default used when the request has no value.
    pub fn param_or(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push(ParamSpec::new(name, ty).with_default(default));
        self
    }

    /// Declare a parameter that receives the live request.
    pub fn request(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamSpec::new(name, ParamType::Request));
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Bind `params` to the declared parameters and run the handler.
    pub fn call(
        &self,
        params: &ParameterSet,
        request: &Request,
    ) -> Result<Response, DispatchError> {
        let args = bind(&self.params, params, request).map_err(|err| {
            tracing::debug!(error = %err, "Argument coercion failed");
            DispatchError::BadRequest(err)
        })?;
        (self.func)(args)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A controller exposes named methods as handlers.
pub trait Controller: Send + Sync {
    /// The handler for `method`, or `None` when the controller has no such method.
    fn action(&self, method: &str) -> Option<Handler>;
}

/// Reference to a controller: a class name to resolve, or a live instance.
#[derive(Clone)]
pub enum ControllerRef {
    Class(String),
    Instance(Arc<dyn Controller>),
}

impl fmt::Debug for ControllerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(name) => f.debug_tuple("Class").field(name).finish(),
            Self::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

/// What a route invokes once matched.
#[derive(Clone, Debug)]
pub enum Action {
    /// A free handler.
    Function(Handler),
    /// A controller method.
    Method {
        controller: ControllerRef,
        method: String,
    },
    /// A `"Class@method"` reference, split at dispatch time.
    ClassMethod(String),
}

impl Action {
    /// Short description for route listings and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Function(_) => "handler".to_string(),
            Self::Method {
                controller: ControllerRef::Class(class),
                method,
            } => format!("{class}@{method}"),
            Self::Method {
                controller: ControllerRef::Instance(_),
                method,
            } => format!("<controller>@{method}"),
            Self::ClassMethod(spec) => spec.clone(),
        }
    }

    pub(crate) fn invoke(
        &self,
        params: &ParameterSet,
        request: &Request,
        resolvers: &Resolvers<'_>,
    ) -> Result<Response, DispatchError> {
        match self {
            Self::Function(handler) => handler.call(params, request),
            Self::Method {
                controller: ControllerRef::Instance(controller),
                method,
            } => call_method(controller.as_ref(), "<controller>", method, params, request),
            Self::Method {
                controller: ControllerRef::Class(class),
                method,
            } => {
                let controller = resolvers.controller(class)?;
                call_method(controller.as_ref(), class, method, params, request)
            }
            Self::ClassMethod(spec) => {
                let (class, method) = spec
                    .split_once('@')
                    .filter(|(class, method)| !class.is_empty() && !method.is_empty())
                    .ok_or_else(|| DispatchError::UnsupportedAction(spec.clone()))?;
                let controller = resolvers.controller(class)?;
                call_method(controller.as_ref(), class, method, params, request)
            }
        }
    }
}

fn call_method(
    controller: &dyn Controller,
    class: &str,
    method: &str,
    params: &ParameterSet,
    request: &Request,
) -> Result<Response, DispatchError> {
    let handler = controller
        .action(method)
        .ok_or_else(|| DispatchError::MissingControllerMethod {
            controller: class.to_string(),
            method: method.to_string(),
        })?;
    handler.call(params, request)
}

impl From<Handler> for Action {
    fn from(handler: Handler) -> Self {
        Self::Function(handler)
    }
}

impl From<&str> for Action {
    fn from(spec: &str) -> Self {
        Self::ClassMethod(spec.to_string())
    }
}

impl From<String> for Action {
    fn from(spec: String) -> Self {
        Self::ClassMethod(spec)
    }
}

impl From<(&str, &str)> for Action {
    fn from((class, method): (&str, &str)) -> Self {
        Self::Method {
            controller: ControllerRef::Class(class.to_string()),
            method: method.to_string(),
        }
    }
}

impl From<(Arc<dyn Controller>, &str)> for Action {
    fn from((controller, method): (Arc<dyn Controller>, &str)) -> Self {
        Self::Method {
            controller: ControllerRef::Instance(controller),
            method: method.to_string(),
        }
    }
}
