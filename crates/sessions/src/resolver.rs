//! Request → session → connection resolution for field resolvers.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    http::HeaderMap,
    tokio::time::Instant,
    tracing::{debug, error, warn},
};

use crate::{
    Error, Result,
    credential::{self, SessionCredential},
    session::{ConnectionInfo, Session},
    store::SessionStore,
};

/// Argument name carried by every connection-scoped field.
pub const CONNECTION_ID_ARG: &str = "connectionId";

/// Snapshot of the inbound HTTP request a GraphQL operation came from.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub request_id: String,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    /// Point after which work for this request should be abandoned.
    pub deadline: Option<Instant>,
}

impl RequestInfo {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            headers,
            remote_addr: None,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// View of one in-flight field resolution, as provided by the execution
/// engine.
pub trait FieldContext {
    /// The originating request, if the engine attached one.
    fn request(&self) -> Option<&RequestInfo>;

    /// A field argument rendered as a string (IDs and strings only).
    fn argument(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub cookie_name: String,
    pub header_name: String,
    pub lookup_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cookie_name: "modgraph_session".into(),
            header_name: "x-session-id".into(),
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

/// Resolves request, session, and connection for field resolvers.
///
/// Holds no per-request state; one instance is shared by every module.
pub struct ContextResolver {
    store: Arc<dyn SessionStore>,
    config: ResolverConfig,
}

impl ContextResolver {
    pub fn new(store: Arc<dyn SessionStore>, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Credential carried by `request`, if any.
    #[must_use]
    pub fn credential(&self, request: &RequestInfo) -> Option<SessionCredential> {
        credential::extract(
            &request.headers,
            &self.config.cookie_name,
            &self.config.header_name,
        )
    }

    /// The request the field resolution originated from.
    ///
    /// A missing request means the engine was wired without attaching
    /// [`RequestInfo`]; that is an integration bug, not a client error.
    pub fn resolve_request<'a, F>(&self, field: &'a F) -> Result<&'a RequestInfo>
    where
        F: FieldContext + ?Sized,
    {
        field.request().ok_or_else(|| {
            error!("field resolution reached the context resolver without a request");
            Error::RequestUnavailable
        })
    }

    /// Look up the session for `request`.
    ///
    /// The lookup is bounded by the configured timeout and by the request
    /// deadline, whichever comes first. Dropping the returned future cancels
    /// the lookup.
    pub async fn resolve_session(&self, request: &RequestInfo) -> Result<Arc<Session>> {
        let Some(credential) = self.credential(request) else {
            debug!(request_id = %request.request_id, "request carries no session credential");
            return Err(Error::SessionNotFound);
        };

        let started = Instant::now();
        let deadline = [started.checked_add(self.config.lookup_timeout), request.deadline]
            .into_iter()
            .flatten()
            .min();

        let lookup = self.store.find(&credential);
        let found = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, lookup).await.map_err(|_| {
                let budget = deadline.saturating_duration_since(started);
                warn!(
                    request_id = %request.request_id,
                    budget_ms = budget.as_millis() as u64,
                    "session lookup timed out"
                );
                Error::SessionLookupTimeout {
                    timeout_ms: budget.as_millis() as u64,
                }
            })??,
            None => lookup.await?,
        };

        let session = found.ok_or(Error::SessionNotFound)?;
        if session.is_expired() {
            debug!(request_id = %request.request_id, session_id = %session.id, "session expired");
            return Err(Error::SessionExpired {
                session_id: session.id.clone(),
            });
        }
        Ok(session)
    }

    /// Look up a connection owned by `session`.
    ///
    /// Only `session`'s own connections are searched; an id owned by another
    /// session is indistinguishable from an unknown id.
    pub fn resolve_connection(
        &self,
        session: &Session,
        connection_id: &str,
    ) -> Result<Arc<ConnectionInfo>> {
        session
            .connection(connection_id)
            .filter(|c| c.session_id == session.id)
            .cloned()
            .ok_or_else(|| Error::connection_not_found(connection_id))
    }

    /// Request → session for a field.
    pub async fn resolve_field_session<F>(&self, field: &F) -> Result<Arc<Session>>
    where
        F: FieldContext + Sync + ?Sized,
    {
        let request = self.resolve_request(field)?;
        self.resolve_session(request).await
    }

    /// Request → session → `connectionId` argument → connection for a field.
    pub async fn resolve_field_connection<F>(
        &self,
        field: &F,
    ) -> Result<(Arc<Session>, Arc<ConnectionInfo>)>
    where
        F: FieldContext + Sync + ?Sized,
    {
        let session = self.resolve_field_session(field).await?;
        let connection_id = field
            .argument(CONNECTION_ID_ARG)
            .ok_or_else(|| Error::connection_not_found(""))?;
        let connection = self.resolve_connection(&session, &connection_id)?;
        Ok((session, connection))
    }
}
