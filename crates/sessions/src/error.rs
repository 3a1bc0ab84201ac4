use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The execution context carried no originating request.
    #[error("field resolution has no originating request")]
    RequestUnavailable,

    #[error("no session matches the request credential")]
    SessionNotFound,

    #[error("session {session_id} has expired")]
    SessionExpired { session_id: String },

    #[error("session lookup timed out after {timeout_ms}ms")]
    SessionLookupTimeout { timeout_ms: u64 },

    #[error("connection '{id}' not found")]
    ConnectionNotFound { id: String },

    #[error("session store failed: {message}")]
    Store { message: String },
}

impl Error {
    /// Stable machine-readable code, exposed to clients as the GraphQL error
    /// extension `code`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequestUnavailable => "REQUEST_UNAVAILABLE",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionExpired { .. } => "SESSION_EXPIRED",
            Self::SessionLookupTimeout { .. } => "SESSION_LOOKUP_TIMEOUT",
            Self::ConnectionNotFound { .. } => "CONNECTION_NOT_FOUND",
            Self::Store { .. } => "SESSION_STORE_ERROR",
        }
    }

    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connection_not_found(id: impl Into<String>) -> Self {
        Self::ConnectionNotFound { id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
