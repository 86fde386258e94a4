//! A single route: compiled path, methods, defaults, middleware and action.
//!
//! # Responsibilities
//! - Keep the compiled matcher in sync with the template and constraints
//! - Match a method + path and extract sanitized parameters over defaults
//! - Merge body, query and path parameters, run middleware, invoke the action
//!
//! # Design Decisions
//! - Every configuration call that affects matching recompiles eagerly
//! - A miss is a `None`, never an error; the router keeps scanning
//! - Extracted values only lose embedded NUL bytes; escaping belongs to the view layer

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{Method, Uri};
use serde_json::Value;

use crate::http::{Request, Response};
use crate::routing::action::Action;
use crate::routing::coerce::ParameterSet;
use crate::routing::error::{DispatchError, RouteError};
use crate::routing::middleware::{Middleware, MiddlewareRef, Next};
use crate::routing::path::CompiledPath;
use crate::routing::resolver::{Container, Resolver, Resolvers};

/// One compiled path + method + action binding.
#[derive(Debug, Clone)]
pub struct Route {
    methods: Vec<Method>,
    compiled: CompiledPath,
    wheres: HashMap<String, String>,
    defaults: ParameterSet,
    name: Option<String>,
    middleware: Vec<MiddlewareRef>,
    action: Action,
}

impl Route {
    pub fn new(
        methods: Vec<Method>,
        template: &str,
        action: impl Into<Action>,
    ) -> Result<Self, RouteError> {
        let wheres = HashMap::new();
        let compiled = CompiledPath::compile(template, &wheres)?;
        Ok(Self {
            methods,
            compiled,
            wheres,
            defaults: ParameterSet::new(),
            name: None,
            middleware: Vec::new(),
            action: action.into(),
        })
    }

    /// Constrain parameter `name` to `pattern`, recompiling the matcher.
    pub fn where_param(
        &mut self,
        name: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Result<&mut Self, RouteError> {
        let mut wheres = self.wheres.clone();
        wheres.insert(name.into(), pattern.into());
        self.compiled = CompiledPath::compile(self.compiled.template(), &wheres)?;
        self.wheres = wheres;
        Ok(self)
    }

    /// Replace the allowed methods (case-insensitive names), recompiling the matcher.
    pub fn methods(&mut self, methods: &[&str]) -> Result<&mut Self, RouteError> {
        let methods = methods
            .iter()
            .map(|m| parse_method(m))
            .collect::<Result<Vec<_>, _>>()?;
        self.compiled = CompiledPath::compile(self.compiled.template(), &self.wheres)?;
        self.methods = methods;
        Ok(self)
    }

    /// Default value used when the path does not supply `name`.
    pub fn default_value(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn middleware(&mut self, middleware: impl Into<MiddlewareRef>) -> &mut Self {
        self.middleware.push(middleware.into());
        self
    }

    pub fn template(&self) -> &str {
        self.compiled.template()
    }

    pub fn pattern(&self) -> &str {
        self.compiled.as_str()
    }

    pub fn param_names(&self) -> &[String] {
        self.compiled.params()
    }

    pub fn allowed_methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn route_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn defaults(&self) -> &ParameterSet {
        &self.defaults
    }

    /// Build a concrete path from `params` over the route defaults.
    pub fn url(&self, params: &ParameterSet) -> Result<String, RouteError> {
        let mut values = self.defaults.clone();
        for (key, value) in params {
            values.insert(key.clone(), value.clone());
        }
        self.compiled.url(&values)
    }

    /// Case-insensitive method membership.
    pub fn allows(&self, method: &str) -> bool {
        self.methods
            .iter()
            .any(|m| m.as_str().eq_ignore_ascii_case(method))
    }

    /// Whether the route accepts `method` on `path`.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.match_request(method, path).is_some()
    }

    /// Match `method` and `path`, returning extracted parameters over defaults.
    pub fn match_request(&self, method: &str, path: &str) -> Option<ParameterSet> {
        if !self.allows(method) {
            return None;
        }
        self.extract(path)
    }

    /// Path-only match, ignoring methods.
    pub fn path_matches(&self, path: &str) -> bool {
        self.compiled.is_match(&path_only(path))
    }

    /// Extract parameters from `path` without looking at the method.
    pub fn extract(&self, path: &str) -> Option<ParameterSet> {
        let captures = self.compiled.captures(&path_only(path))?;
        let mut params = self.defaults.clone();
        for (name, value) in captures {
            match value {
                Some(raw) => {
                    params.insert(name, Value::String(raw.replace('\0', "")));
                }
                None => {
                    params.entry(name).or_insert(Value::Null);
                }
            }
        }
        Some(params)
    }

    /// Run the route for `request` with parameters already extracted from its path.
    ///
    /// Precedence: body over query over path over defaults.
    pub fn execute(
        &self,
        path_params: ParameterSet,
        request: &Request,
        resolver: Option<&dyn Resolver>,
        container: &Container,
    ) -> Result<Response, DispatchError> {
        let mut params = path_params;
        for (key, value) in request.query() {
            params.insert(key.clone(), value.clone());
        }
        for (key, value) in request.body_params() {
            params.insert(key, value);
        }

        let resolvers = Resolvers::new(resolver, container);
        let chain = self
            .middleware
            .iter()
            .map(|reference| resolvers.middleware(reference))
            .collect::<Result<Vec<Arc<dyn Middleware>>, _>>()?;

        let endpoint =
            |params: ParameterSet| self.action.invoke(&params, request, &resolvers);
        Next::new(request, &chain, &endpoint).run(params)
    }
}

/// Parse a method name case-insensitively.
pub fn parse_method(method: &str) -> Result<Method, RouteError> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| RouteError::InvalidMethod(method.to_string()))
}

/// Reduce a request target to its path, dropping scheme, host, query and fragment.
pub fn path_only(target: &str) -> String {
    if let Ok(uri) = target.parse::<Uri>() {
        return uri.path().to_string();
    }
    let without_fragment = target.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();
    match without_query.split_once("://") {
        Some((_, rest)) => rest
            .find('/')
            .map(|i| rest[i..].to_string())
            .unwrap_or_else(|| "/".to_string()),
        None => without_query.to_string(),
    }
}
