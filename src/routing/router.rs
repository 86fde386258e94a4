//! Route registry and dispatch.
//!
//! # Responsibilities
//! - Register routes per method in insertion order
//! - Find the first route matching a request, with `HEAD` falling back to `GET`
//! - Distinguish "path unknown" (404) from "method not allowed" (405)
//! - Generate URLs for named routes
//!
//! # Design Decisions
//! - Registration order is match priority; overlapping patterns resolve to the earliest
//! - Immutable after construction, so it can be shared behind an `Arc`
//! - `HEAD` handled by a `GET` route assumes that handler has no side effects

use std::time::Instant;

use axum::http::Method;

use crate::http::{Request, Response};
use crate::routing::action::Action;
use crate::routing::coerce::ParameterSet;
use crate::routing::error::{DispatchError, RouteError};
use crate::routing::middleware::MiddlewareRef;
use crate::routing::route::{parse_method, Route};
use crate::routing::resolver::{Container, Resolver};

/// Methods registered by [`Router::any`].
pub const ANY_METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

#[derive(Debug, Clone)]
struct Group {
    prefix: String,
    middleware: Vec<MiddlewareRef>,
}

/// Ordered route registry.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
    container: Container,
    groups: Vec<Group>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router whose fallback resolver is `container`.
    pub fn with_container(container: Container) -> Self {
        Self {
            container,
            ..Self::default()
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    pub fn get(&mut self, path: &str, action: impl Into<Action>) -> Result<&mut Route, RouteError> {
        self.add(vec![Method::GET], path, action.into())
    }

    pub fn post(&mut self, path: &str, action: impl Into<Action>) -> Result<&mut Route, RouteError> {
        self.add(vec![Method::POST], path, action.into())
    }

    pub fn put(&mut self, path: &str, action: impl Into<Action>) -> Result<&mut Route, RouteError> {
        self.add(vec![Method::PUT], path, action.into())
    }

    pub fn patch(&mut self, path: &str, action: impl Into<Action>) -> Result<&mut Route, RouteError> {
        self.add(vec![Method::PATCH], path, action.into())
    }

    pub fn delete(&mut self, path: &str, action: impl Into<Action>) -> Result<&mut Route, RouteError> {
        self.add(vec![Method::DELETE], path, action.into())
    }

    pub fn any(&mut self, path: &str, action: impl Into<Action>) -> Result<&mut Route, RouteError> {
        self.add(ANY_METHODS.to_vec(), path, action.into())
    }

    /// Register `path` for an explicit set of methods.
    pub fn match_methods(
        &mut self,
        methods: &[&str],
        path: &str,
        action: impl Into<Action>,
    ) -> Result<&mut Route, RouteError> {
        let methods = methods
            .iter()
            .map(|m| parse_method(m))
            .collect::<Result<Vec<_>, _>>()?;
        self.add(methods, path, action.into())
    }

    /// Register the routes added by `f` under `prefix`, behind `middleware`.
    pub fn group<F>(
        &mut self,
        prefix: &str,
        middleware: Vec<MiddlewareRef>,
        f: F,
    ) -> Result<(), RouteError>
    where
        F: FnOnce(&mut Router) -> Result<(), RouteError>,
    {
        self.groups.push(Group {
            prefix: prefix.to_string(),
            middleware,
        });
        let result = f(self);
        self.groups.pop();
        result
    }

    fn add(&mut self, methods: Vec<Method>, path: &str, action: Action) -> Result<&mut Route, RouteError> {
        let template = self.prefixed(path);
        let mut route = Route::new(methods, &template, action)?;
        for group in &self.groups {
            for middleware in &group.middleware {
                route.middleware(middleware.clone());
            }
        }

        tracing::debug!(
            methods = ?route.allowed_methods(),
            template = %route.template(),
            pattern = %route.pattern(),
            action = %route.action().describe(),
            "Route registered"
        );

        let index = self.routes.len();
        self.routes.push(route);
        Ok(&mut self.routes[index])
    }

    fn prefixed(&self, path: &str) -> String {
        let mut full = String::new();
        for group in &self.groups {
            let prefix = group.prefix.trim_matches('/');
            if !prefix.is_empty() {
                full.push('/');
                full.push_str(prefix);
            }
        }
        let path = path.trim_start_matches('/');
        if !path.is_empty() {
            full.push('/');
            full.push_str(path);
        }
        if full.is_empty() {
            full.push('/');
        }
        full
    }

    /// All routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn named(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.route_name() == Some(name))
    }

    /// Build the path of the route called `name`.
    pub fn url(&self, name: &str, params: &ParameterSet) -> Result<String, RouteError> {
        let route = self
            .named(name)
            .ok_or_else(|| RouteError::UnknownName(name.to_string()))?;
        route.url(params)
    }

    /// Find the route for `method` and `path` without running it.
    pub fn find(&self, method: &str, path: &str) -> Result<(&Route, ParameterSet), DispatchError> {
        if let Some(hit) = self.scan(method, path) {
            return Ok(hit);
        }

        if method.eq_ignore_ascii_case("HEAD") {
            if let Some(hit) = self.scan("GET", path) {
                tracing::debug!(path = %path, "HEAD served by GET route");
                return Ok(hit);
            }
        }

        let mut allowed: Vec<String> = self
            .routes
            .iter()
            .filter(|route| route.path_matches(path))
            .flat_map(|route| route.allowed_methods().iter().map(|m| m.to_string()))
            .collect();
        allowed.sort();
        allowed.dedup();

        if allowed.is_empty() {
            Err(DispatchError::NotFound {
                method: method.to_ascii_uppercase(),
                path: path.to_string(),
            })
        } else {
            Err(DispatchError::MethodNotAllowed {
                method: method.to_ascii_uppercase(),
                path: path.to_string(),
                allowed,
            })
        }
    }

    fn scan(&self, method: &str, path: &str) -> Option<(&Route, ParameterSet)> {
        self.routes
            .iter()
            .find_map(|route| route.match_request(method, path).map(|params| (route, params)))
    }

    /// Dispatch `request` using the router's own container.
    pub fn dispatch(&self, request: &Request) -> Result<Response, DispatchError> {
        self.dispatch_with(request, None)
    }

    /// Dispatch `request`, asking `resolver` for controllers before the container.
    pub fn dispatch_with(
        &self,
        request: &Request,
        resolver: Option<&dyn Resolver>,
    ) -> Result<Response, DispatchError> {
        let start = Instant::now();
        let method = request.method().as_str();
        let path = request.path();

        let (route, params) = match self.find(method, path) {
            Ok(hit) => hit,
            Err(err) => {
                tracing::debug!(method = %method, path = %path, error = %err, "No route dispatched");
                return Err(err);
            }
        };

        tracing::debug!(
            method = %method,
            path = %path,
            template = %route.template(),
            "Route matched"
        );

        let result = route.execute(params, request, resolver, &self.container);
        match &result {
            Ok(response) => tracing::debug!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "Request dispatched"
            ),
            Err(err) if err.is_client_error() => tracing::info!(
                method = %method,
                path = %path,
                error = %err,
                "Request rejected"
            ),
            Err(err) => tracing::error!(
                method = %method,
                path = %path,
                error = %err,
                "Dispatch failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::action::Handler;
    use crate::routing::coerce::ParamType;
    use axum::http::Uri;
    use serde_json::json;

    fn tag(label: &'static str) -> Handler {
        Handler::new(move |_| Ok(Response::text(label)))
    }

    fn request(method: Method, uri: &'static str) -> Request {
        Request::new(method, Uri::from_static(uri))
    }

    #[test]
    fn test_first_registration_wins() {
        let mut router = Router::new();
        router.get("/users/{id}", tag("generic")).unwrap();
        router.get("/users/me", tag("me")).unwrap();

        let response = router.dispatch(&request(Method::GET, "/users/me")).unwrap();
        assert_eq!(response.text_body(), Some("generic"));
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let mut router = Router::new();
        router.get("/ping", tag("get")).unwrap();
        let response = router.dispatch(&request(Method::HEAD, "/ping")).unwrap();
        assert_eq!(response.text_body(), Some("get"));

        router.match_methods(&["head"], "/ping", tag("head")).unwrap();
        let response = router.dispatch(&request(Method::HEAD, "/ping")).unwrap();
        assert_eq!(response.text_body(), Some("head"));
    }

    #[test]
    fn test_not_found_and_method_not_allowed() {
        let mut router = Router::new();
        router.get("/users/{id:\\d+}", tag("get")).unwrap();
        router.post("/users/{id:\\d+}", tag("post")).unwrap();

        match router.dispatch(&request(Method::DELETE, "/users/7")) {
            Err(DispatchError::MethodNotAllowed { allowed, .. }) => {
                assert_eq!(allowed, vec!["GET", "POST"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            router.dispatch(&request(Method::GET, "/users/seven")),
            Err(DispatchError::NotFound { .. })
        ));
    }

    #[test]
    fn test_groups_prefix_and_middleware() {
        let mut router = Router::new();
        router
            .group("/api/", vec!["auth".into()], |r| {
                r.get("/products", tag("list"))?.name("products.index");
                r.group("v2", Vec::new(), |r| {
                    r.get("products/{id}", tag("show"))?.name("products.show");
                    Ok(())
                })
            })
            .unwrap();
        router.get("/", tag("home")).unwrap();

        let templates: Vec<&str> = router.routes().iter().map(Route::template).collect();
        assert_eq!(templates, vec!["/api/products", "/api/v2/products/{id}", "/"]);

        // group middleware is resolved at dispatch; nothing registered it
        assert!(matches!(
            router.dispatch(&request(Method::GET, "/api/products")),
            Err(DispatchError::UnresolvedMiddleware(_))
        ));
        assert_eq!(
            router.dispatch(&request(Method::GET, "/")).unwrap().text_body(),
            Some("home")
        );
    }

    #[test]
    fn test_named_url() {
        let mut router = Router::new();
        router
            .get("/shops/{shop}/items/{id?}", tag("item"))
            .unwrap()
            .name("items.show")
            .default_value("shop", "main");

        let params = json!({"id": 5}).as_object().cloned().unwrap();
        assert_eq!(router.url("items.show", &params).unwrap(), "/shops/main/items/5");
        assert_eq!(
            router.url("items.show", &ParameterSet::new()).unwrap(),
            "/shops/main/items"
        );
        assert!(matches!(
            router.url("nope", &params),
            Err(RouteError::UnknownName(_))
        ));
    }

    #[test]
    fn test_any_and_coercion_error() {
        let mut router = Router::new();
        router
            .any(
                "/flags/{on}",
                Handler::new(|args| Ok(Response::json(json!({"on": args.bool("on")}))))
                    .param("on", ParamType::Bool),
            )
            .unwrap();

        let response = router.dispatch(&request(Method::PATCH, "/flags/yes")).unwrap();
        assert_eq!(response.json_body(), Some(&json!({"on": true})));

        let err = router.dispatch(&request(Method::PUT, "/flags/maybe")).unwrap_err();
        assert!(matches!(err, DispatchError::BadRequest(_)));
    }
}
