//! Error taxonomy for data-access operations.
//!
//! Validation errors (`InvalidArgument`, `NoTimeWindow`, `UnknownUnit`) are
//! raised locally before any backend call is issued, and `PermissionDenied`
//! is checked locally before every write. Backend failures are surfaced
//! verbatim, wrapped with operation context; the façade never retries.

use thiserror::Error;

/// Main error type for data-access operations.
#[derive(Error, Debug)]
pub enum DataAccessError {
    /// Bad enum value, wrong arity, or malformed identifier.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A read or write required a time window and neither the call nor the
    /// session supplied one.
    #[error("no default or explicit time window")]
    NoTimeWindow,

    /// The parameter has no resolvable unit in the active unit system.
    #[error("could not determine unit for parameter: {0}")]
    UnknownUnit(String),

    /// Write attempted against a backend the connected identity may not
    /// mutate.
    #[error("cannot write to {0}")]
    PermissionDenied(String),

    /// The identifier has no backend data or extent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rating store with `fail_if_exists` against existing data.
    #[error("already exists: {0}")]
    ConflictExists(String),

    /// Connection or authentication failure.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend returned data this façade cannot normalize.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// Operation attempted after the session was closed.
    #[error("session is not open")]
    SessionClosed,

    /// A backend-originated failure, wrapped with operation context.
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DataAccessError {
    /// Shorthand for an `InvalidArgument` error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        DataAccessError::InvalidArgument(msg.into())
    }

    /// Wrap a backend-originated error with operation context.
    pub fn backend(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DataAccessError::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Type alias for Results using DataAccessError.
pub type Result<T> = std::result::Result<T, DataAccessError>;
