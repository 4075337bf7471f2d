//! Error types for container startup and request dispatch

use serde::Serialize;
use serde_json::{json, Value};
use std::error::Error as StdError;
use thiserror::Error;

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[inline]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Request-scoped validation failure.
///
/// Collects every field-level problem before surfacing, never just the
/// first one. Maps to HTTP 400 with a structured `details` list.
#[derive(Debug, Clone, Error)]
#[error("{}", self.summary())]
pub struct ValidationError {
    pub details: Vec<FieldError>,
}

impl ValidationError {
    #[inline]
    pub fn new(details: Vec<FieldError>) -> Self {
        Self { details }
    }

    /// Single-field failure shorthand.
    #[inline]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            details: vec![FieldError::new(field, message)],
        }
    }

    fn summary(&self) -> String {
        self.details
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Response body shape: `{"error": "Validation failed", "details": [...]}`.
    pub fn to_body(&self) -> Value {
        json!({
            "error": "Validation failed",
            "details": self.details,
        })
    }
}

/// Errors that abort container initialization.
///
/// These are never caught internally; startup either completes or fails
/// with the full context of what went wrong.
#[derive(Error, Debug)]
pub enum StartupError {
    /// The dependency graph contains a cycle among the named types.
    #[error("circular dependency detected among: {}", .members.join(", "))]
    CircularDependency { members: Vec<&'static str> },

    /// A factory's owning component has no instance at resolution time.
    #[error("factory for {produced} cannot run: parent component {parent} has no instance")]
    FactoryParentMissing {
        parent: &'static str,
        produced: &'static str,
    },
}

/// Result type alias for startup operations
pub type StartupResult<T> = std::result::Result<T, StartupError>;

/// Type-erased application error thrown by a handler or interceptor.
///
/// Captures the concrete error's type name at construction so the default
/// 500 mapping can report it, and supports downcasting for the registered
/// error-handler table.
pub struct AppError {
    type_name: &'static str,
    inner: Box<dyn StdError + Send + Sync>,
}

impl AppError {
    #[inline]
    pub fn new<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self {
            type_name: std::any::type_name::<E>(),
            inner: Box::new(err),
        }
    }

    /// Full path of the wrapped error type.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Last path segment of the wrapped error type.
    pub fn short_type_name(&self) -> &'static str {
        self.type_name.rsplit("::").next().unwrap_or(self.type_name)
    }

    #[inline]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("type_name", &self.type_name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

/// Request-scoped errors caught at the outermost dispatch boundary.
///
/// Every variant converts to a response; none propagates past the pipeline.
#[derive(Error, Debug)]
pub enum HttpError {
    /// Maps to HTTP 400 with the aggregated details list.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Maps to HTTP 401.
    #[error("{0}")]
    AuthenticationRequired(String),

    /// Maps to HTTP 404.
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// Structural programming error: a handler parameter was declared
    /// without a binding spec. Surfaces as HTTP 500 on first dispatch.
    #[error("parameter '{param}' has no type annotation")]
    MissingTypeAnnotation { param: String },

    /// Any other error thrown by a handler or interceptor. Checked against
    /// the registered error-handler table, falling back to HTTP 500.
    #[error("{0}")]
    App(#[from] AppError),
}

impl HttpError {
    /// Wrap an application error thrown by a handler.
    #[inline]
    pub fn app<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::App(AppError::new(err))
    }
}

/// Result type alias for request handling
pub type HttpResult<T> = std::result::Result<T, HttpError>;
