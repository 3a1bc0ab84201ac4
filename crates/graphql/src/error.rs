//! Startup errors and field-error mapping.

use {async_graphql::ErrorExtensions, modgraph_service_traits::ServiceError};

/// Errors raised while assembling the executable schema.
///
/// All of them are startup-fatal: the server must not accept traffic with an
/// inconsistent schema.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] modgraph_schema::Error),

    #[error("module '{name}' is registered more than once")]
    DuplicateModule { name: String },

    #[error("resolver for {type_name}.{field} registered by both '{first}' and '{second}'")]
    ResolverConflict {
        type_name: String,
        field: String,
        first: String,
        second: String,
    },

    #[error("module '{module}' registers a resolver for unknown field {type_name}.{field}")]
    UnknownField {
        module: String,
        type_name: String,
        field: String,
    },

    #[error("failed to build executable schema: {message}")]
    Build { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Map a service error to a GraphQL field error carrying `extensions.code`.
pub fn field_error(error: ServiceError) -> async_graphql::Error {
    let code = error.code();
    let extra = match &error {
        ServiceError::RateLimited { retry_after_ms, .. } => Some(*retry_after_ms),
        _ => None,
    };
    async_graphql::Error::new(error.to_string()).extend_with(|_, e| {
        e.set("code", code);
        if let Some(retry_after_ms) = extra {
            e.set("retryAfterMs", retry_after_ms);
        }
    })
}

/// Map a context resolution failure to a GraphQL field error.
pub fn context_error(error: modgraph_sessions::Error) -> async_graphql::Error {
    field_error(ServiceError::Context(error))
}

/// Convert a serialization failure into a field error.
pub fn serde_error(error: serde_json::Error) -> async_graphql::Error {
    field_error(ServiceError::Serde(error))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn field_error_carries_code() {
        let err = field_error(ServiceError::Context(
            modgraph_sessions::Error::SessionExpired {
                session_id: "s1".into(),
            },
        ));
        let code = err.extensions.as_ref().and_then(|e| e.get("code")).cloned();
        assert_eq!(code, Some(async_graphql::Value::from("SESSION_EXPIRED")));
    }

    #[test]
    fn rate_limited_reports_retry_hint() {
        let err = field_error(ServiceError::RateLimited {
            capability: "core".into(),
            retry_after_ms: 1500,
        });
        let ext = err.extensions.unwrap();
        assert_eq!(ext.get("code"), Some(&async_graphql::Value::from("RATE_LIMITED")));
        assert_eq!(ext.get("retryAfterMs"), Some(&async_graphql::Value::from(1500_u64)));
    }
}
