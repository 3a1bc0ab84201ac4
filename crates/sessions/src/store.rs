//! Session lookup seam and an in-memory store.

use std::{sync::Arc, time::Duration};

use {async_trait::async_trait, dashmap::DashMap, tracing::debug};

use crate::{
    Error, Result,
    credential::SessionCredential,
    session::{ConnectionInfo, Session, UserIdentity, now_ms},
};

/// Read access to session state, keyed by request credential.
///
/// Lookups may perform I/O. Implementations must allow lookups for
/// different requests to proceed independently.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, credential: &SessionCredential) -> Result<Option<Arc<Session>>>;
}

/// Session store kept in process memory.
///
/// Updates replace the stored snapshot, so a reader that already resolved a
/// session keeps a consistent view for the rest of its request.
pub struct MemorySessionStore {
    sessions: DashMap<String, Arc<Session>>,
    ttl: Option<Duration>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemorySessionStore {
    /// Create a store; sessions created through it expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    fn expiry_from_now(&self) -> Option<u64> {
        self.ttl
            .map(|ttl| now_ms().saturating_add(ttl.as_millis() as u64))
    }

    /// Create and store a fresh session with a random id.
    pub fn create(&self, user: Option<UserIdentity>) -> Arc<Session> {
        let mut session = Session::new(uuid::Uuid::new_v4().to_string());
        session.user = user;
        session.expires_at = self.expiry_from_now();
        self.insert(session)
    }

    /// Store `session`, replacing any session with the same id.
    pub fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions.insert(session.id.clone(), Arc::clone(&session));
        debug!(session_id = %session.id, "stored session");
        session
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    fn update(
        &self,
        session_id: &str,
        apply: impl FnOnce(Session) -> Session,
    ) -> Result<Arc<Session>> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or(Error::SessionNotFound)?;
        let next = Arc::new(apply(Session::clone(entry.value())));
        *entry.value_mut() = Arc::clone(&next);
        Ok(next)
    }

    /// Attach a connection to a session. The connection's owner is set to
    /// `session_id` regardless of what the caller passed.
    pub fn add_connection(
        &self,
        session_id: &str,
        connection: ConnectionInfo,
    ) -> Result<Arc<ConnectionInfo>> {
        let id = connection.id.clone();
        let session = self.update(session_id, |s| s.with_connection(connection))?;
        session
            .connection(&id)
            .cloned()
            .ok_or_else(|| Error::connection_not_found(id))
    }

    /// Detach a connection. Returns whether it was present.
    pub fn remove_connection(&self, session_id: &str, connection_id: &str) -> Result<bool> {
        let existed = self
            .get(session_id)
            .ok_or(Error::SessionNotFound)?
            .connection(connection_id)
            .is_some();
        if existed {
            self.update(session_id, |s| s.without_connection(connection_id))?;
        }
        Ok(existed)
    }

    /// Extend the session's expiry by the store ttl.
    pub fn touch(&self, session_id: &str) -> Result<Arc<Session>> {
        let expires_at = self.expiry_from_now();
        self.update(session_id, |mut s| {
            s.expires_at = expires_at;
            s
        })
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Drop every expired session; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_ms();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!(purged, "purged expired sessions");
        }
        purged
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find(&self, credential: &SessionCredential) -> Result<Option<Arc<Session>>> {
        Ok(self.get(credential.as_str()))
    }
}
