//! Controller and middleware resolution.
//!
//! # Responsibilities
//! - Define the resolver contract `(name) -> instance` used at dispatch
//! - Provide `Container`, the default resolver built from registrations
//!
//! # Design Decisions
//! - An injected resolver is asked first; the router's container is the fallback
//! - Types registered with `register` are built through `Default`

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::routing::action::Controller;
use crate::routing::error::DispatchError;
use crate::routing::middleware::{Middleware, MiddlewareRef};

type ControllerFactory = Arc<dyn Fn() -> Arc<dyn Controller> + Send + Sync>;
type MiddlewareFactory = Arc<dyn Fn() -> Arc<dyn Middleware> + Send + Sync>;

/// Resolves controllers and middleware by name.
pub trait Resolver: Send + Sync {
    fn controller(&self, name: &str) -> Option<Arc<dyn Controller>>;

    fn middleware(&self, _name: &str) -> Option<Arc<dyn Middleware>> {
        None
    }
}

/// Registry of named controller and middleware factories.
#[derive(Clone, Default)]
pub struct Container {
    controllers: HashMap<String, ControllerFactory>,
    middleware: HashMap<String, MiddlewareFactory>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller type built with `Default` on every resolution.
    pub fn register<C>(&mut self, name: impl Into<String>) -> &mut Self
    where
        C: Controller + Default + 'static,
    {
        self.bind(name, || Arc::new(C::default()) as Arc<dyn Controller>)
    }

    /// Register a controller factory.
    pub fn bind<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Controller> + Send + Sync + 'static,
    {
        self.controllers.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a shared controller instance.
    pub fn instance(&mut self, name: impl Into<String>, controller: Arc<dyn Controller>) -> &mut Self {
        self.bind(name, move || controller.clone())
    }

    /// Register a middleware type built with `Default`.
    pub fn register_middleware<M>(&mut self, name: impl Into<String>) -> &mut Self
    where
        M: Middleware + Default + 'static,
    {
        self.middleware.insert(
            name.into(),
            Arc::new(|| Arc::new(M::default()) as Arc<dyn Middleware>),
        );
        self
    }

    /// Register a shared middleware instance.
    pub fn bind_middleware(&mut self, name: impl Into<String>, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware
            .insert(name.into(), Arc::new(move || middleware.clone()));
        self
    }

    pub fn has_controller(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }
}

impl Resolver for Container {
    fn controller(&self, name: &str) -> Option<Arc<dyn Controller>> {
        self.controllers.get(name).map(|factory| factory())
    }

    fn middleware(&self, name: &str) -> Option<Arc<dyn Middleware>> {
        self.middleware.get(name).map(|factory| factory())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .field("middleware", &self.middleware.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The injected resolver (if any) in front of the router's container.
pub(crate) struct Resolvers<'a> {
    primary: Option<&'a dyn Resolver>,
    fallback: &'a Container,
}

impl<'a> Resolvers<'a> {
    pub(crate) fn new(primary: Option<&'a dyn Resolver>, fallback: &'a Container) -> Self {
        Self { primary, fallback }
    }

    pub(crate) fn controller(&self, name: &str) -> Result<Arc<dyn Controller>, DispatchError> {
        self.primary
            .and_then(|r| r.controller(name))
            .or_else(|| self.fallback.controller(name))
            .ok_or_else(|| DispatchError::UnresolvedController(name.to_string()))
    }

    pub(crate) fn middleware(&self, reference: &MiddlewareRef) -> Result<Arc<dyn Middleware>, DispatchError> {
        match reference {
            MiddlewareRef::Instance(middleware) => Ok(middleware.clone()),
            MiddlewareRef::Named(name) => self
                .primary
                .and_then(|r| r.middleware(name))
                .or_else(|| self.fallback.middleware(name))
                .ok_or_else(|| DispatchError::UnresolvedMiddleware(name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::action::Handler;

    #[derive(Default)]
    struct Empty;

    impl Controller for Empty {
        fn action(&self, _method: &str) -> Option<Handler> {
            None
        }
    }

    struct Override;

    impl Resolver for Override {
        fn controller(&self, name: &str) -> Option<Arc<dyn Controller>> {
            (name == "Special").then(|| Arc::new(Empty) as Arc<dyn Controller>)
        }
    }

    #[test]
    fn test_primary_then_fallback() {
        let mut container = Container::new();
        container.register::<Empty>("Plain");
        let primary = Override;
        let resolvers = Resolvers::new(Some(&primary), &container);

        assert!(resolvers.controller("Special").is_ok());
        assert!(resolvers.controller("Plain").is_ok());
        assert!(matches!(
            resolvers.controller("Other"),
            Err(DispatchError::UnresolvedController(name)) if name == "Other"
        ));
    }

    #[test]
    fn test_named_middleware() {
        let mut container = Container::new();
        container.bind_middleware(
            "noop",
            crate::routing::middleware::from_fn(|_req, params, next| next.run(params)),
        );
        let resolvers = Resolvers::new(None, &container);

        assert!(resolvers.middleware(&MiddlewareRef::from("noop")).is_ok());
        assert!(matches!(
            resolvers.middleware(&MiddlewareRef::from("auth")),
            Err(DispatchError::UnresolvedMiddleware(_))
        ));
    }
}
