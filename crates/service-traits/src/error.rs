//! Request-scoped error taxonomy shared by every service module.

use serde_json::Value;

use crate::Invocation;

/// Error type returned by capability methods and by interception checks.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("permission denied for {capability}.{operation}: {reason}")]
    PermissionDenied {
        capability: String,
        operation: String,
        reason: String,
    },

    #[error("rate limit exceeded for {capability}, retry after {retry_after_ms}ms")]
    RateLimited {
        capability: String,
        retry_after_ms: u64,
    },

    /// Request, session, or connection resolution failed.
    #[error(transparent)]
    Context(#[from] modgraph_sessions::Error),

    #[error("{message}")]
    Message { message: String },

    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl ServiceError {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }

    /// Denial for the call described by `invocation`.
    #[must_use]
    pub fn permission_denied(invocation: &Invocation<'_>, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            capability: invocation.capability.to_string(),
            operation: invocation.operation.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code, exposed to clients as the GraphQL error
    /// extension `code`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Context(e) => e.code(),
            Self::Message { .. } => "SERVICE_ERROR",
            Self::Serde(_) => "SERIALIZATION_ERROR",
        }
    }

    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

impl From<String> for ServiceError {
    fn from(value: String) -> Self {
        Self::message(value)
    }
}

impl From<&str> for ServiceError {
    fn from(value: &str) -> Self {
        Self::message(value)
    }
}

pub type ServiceResult<T = Value> = Result<T, ServiceError>;
