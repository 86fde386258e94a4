//! Routing and dispatch error definitions.

use axum::http::StatusCode;
use thiserror::Error;

use crate::db::DbError;

/// Errors raised while registering or configuring a route.
///
/// These are programming errors: they surface at startup, never per request.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The path template could not be parsed.
    #[error("invalid route template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// Parameter names must be identifiers.
    #[error("invalid parameter name `{0}`")]
    InvalidParamName(String),

    /// The same parameter name was used twice in one template.
    #[error("parameter `{name}` appears more than once in `{template}`")]
    DuplicateParam { name: String, template: String },

    /// A constraint produced a pattern the regex engine rejects.
    #[error("invalid pattern for route `{template}`: {source}")]
    InvalidPattern {
        template: String,
        #[source]
        source: regex::Error,
    },

    /// Unparseable HTTP method name.
    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),

    /// URL generation was asked for a route name nobody registered.
    #[error("no route named `{0}`")]
    UnknownName(String),

    /// URL generation is missing a required parameter.
    #[error("missing parameter `{param}` for route `{route}`")]
    MissingParam { route: String, param: String },

    /// URL generation got a value its route could never match.
    #[error("value `{value}` for parameter `{param}` does not satisfy the constraint of route `{route}`")]
    ConstraintViolation {
        route: String,
        param: String,
        value: String,
    },
}

/// Failure converting a raw parameter value into its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("parameter `{name}` must be numeric, got `{value}`")]
    NotNumeric { name: String, value: String },

    #[error("parameter `{name}` must be a boolean, got `{value}`")]
    InvalidBool { name: String, value: String },
}

/// Errors produced while dispatching a request.
///
/// Routing misses are recoverable and map onto 404/405. Coercion failures are
/// the caller's fault (400). Action resolution failures are configuration bugs.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route matches {method} {path}")]
    NotFound { method: String, path: String },

    #[error("method {method} not allowed for {path} (allowed: {})", .allowed.join(", "))]
    MethodNotAllowed {
        method: String,
        path: String,
        allowed: Vec<String>,
    },

    #[error("bad request: {0}")]
    BadRequest(#[from] CoercionError),

    #[error("unsupported action `{0}`")]
    UnsupportedAction(String),

    #[error("controller `{0}` could not be resolved")]
    UnresolvedController(String),

    #[error("controller `{controller}` has no method `{method}`")]
    MissingControllerMethod { controller: String, method: String },

    #[error("middleware `{0}` could not be resolved")]
    UnresolvedMiddleware(String),

    #[error(transparent)]
    Database(#[from] DbError),

    /// Raised by handlers that want to fail with a specific status.
    #[error("{message}")]
    Abort { status: StatusCode, message: String },
}

impl DispatchError {
    /// Fail the current request with the given status and message.
    pub fn abort(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Abort {
            status,
            message: message.into(),
        }
    }

    /// HTTP status the outer kernel should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Database(DbError::ModelNotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Abort { status, .. } => *status,
            Self::UnsupportedAction(_)
            | Self::UnresolvedController(_)
            | Self::MissingControllerMethod { .. }
            | Self::UnresolvedMiddleware(_)
            | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure was caused by the client rather than the server.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = DispatchError::NotFound {
            method: "GET".into(),
            path: "/x".into(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = DispatchError::BadRequest(CoercionError::NotNumeric {
            name: "id".into(),
            value: "abc".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.is_client_error());

        let err = DispatchError::UnsupportedAction("Nope".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.is_client_error());

        let err = DispatchError::Database(DbError::ModelNotFound {
            model: "Product",
            key: "id",
            id: "9".into(),
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_method_not_allowed_display() {
        let err = DispatchError::MethodNotAllowed {
            method: "DELETE".into(),
            path: "/users/7".into(),
            allowed: vec!["GET".into(), "POST".into()],
        };
        assert_eq!(
            err.to_string(),
            "method DELETE not allowed for /users/7 (allowed: GET, POST)"
        );
    }
}
