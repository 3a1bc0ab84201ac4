use std::{net::SocketAddr, sync::Arc};

use modgraph_sessions::{RequestInfo, Session};

/// Ambient context of a call into a capability.
///
/// Built per request and bound into the dispatch target, so checks see the
/// caller without reaching for globals.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub session: Option<Arc<Session>>,
    pub remote_addr: Option<SocketAddr>,
    pub request_id: Option<String>,
}

impl CallContext {
    /// Context with no session, e.g. for startup tasks.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_session(session: Arc<Session>) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    /// Context carrying the request's address and id, plus `session` when
    /// one was resolved.
    #[must_use]
    pub fn for_request(request: &RequestInfo, session: Option<Arc<Session>>) -> Self {
        Self {
            session,
            remote_addr: request.remote_addr,
            request_id: Some(request.request_id.clone()),
        }
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref().map(|s| s.id.as_str())
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.session
            .as_deref()
            .and_then(|s| s.user.as_ref())
            .map(|u| u.user_id.as_str())
    }

    /// Identity used to attribute calls: session id, else remote IP.
    #[must_use]
    pub fn subject(&self) -> String {
        match (self.session_id(), self.remote_addr) {
            (Some(id), _) => format!("session:{id}"),
            (None, Some(addr)) => format!("ip:{}", addr.ip()),
            (None, None) => "anonymous".to_string(),
        }
    }
}
