//! Session and connection entities.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize, Serializer};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Authenticated user attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            permissions: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// A logical backend connection owned by exactly one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub connected: bool,
    /// Id of the owning session.
    pub session_id: String,
}

impl ConnectionInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            driver: driver.into(),
            connected: false,
            session_id: String::new(),
        }
    }

    #[must_use]
    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }
}

/// Snapshot of a client session.
///
/// A resolved `Arc<Session>` never changes. Stores apply updates by
/// replacing the snapshot, so readers holding an older one are unaffected.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user: Option<UserIdentity>,
    pub created_at: u64,
    pub expires_at: Option<u64>,
    #[serde(serialize_with = "serialize_connections")]
    connections: BTreeMap<String, Arc<ConnectionInfo>>,
}

fn serialize_connections<S: Serializer>(
    connections: &BTreeMap<String, Arc<ConnectionInfo>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(connections.values().map(Arc::as_ref))
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user: None,
            created_at: now_ms(),
            expires_at: None,
            connections: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: UserIdentity) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Add a connection, taking ownership of it for this session.
    #[must_use]
    pub fn with_connection(mut self, mut connection: ConnectionInfo) -> Self {
        connection.session_id = self.id.clone();
        self.connections
            .insert(connection.id.clone(), Arc::new(connection));
        self
    }

    #[must_use]
    pub fn without_connection(mut self, id: &str) -> Self {
        self.connections.remove(id);
        self
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }

    #[must_use]
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.user
            .as_ref()
            .is_some_and(|u| u.has_permission(permission))
    }

    /// Connection owned by this session.
    #[must_use]
    pub fn connection(&self, id: &str) -> Option<&Arc<ConnectionInfo>> {
        self.connections.get(id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Arc<ConnectionInfo>> {
        self.connections.values()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn connection_takes_session_ownership() {
        let session = Session::new("s1").with_connection(ConnectionInfo::new("c1", "Local", "pg"));
        let conn = session.connection("c1");
        assert_eq!(conn.map(|c| c.session_id.as_str()), Some("s1"));
    }

    #[test]
    fn expiry_is_inclusive() {
        let session = Session::new("s1").with_expiry(1_000);
        assert!(!session.is_expired_at(999));
        assert!(session.is_expired_at(1_000));
        assert!(!Session::new("s2").is_expired());
    }

    #[test]
    fn anonymous_session_has_no_permissions() {
        let session = Session::new("s1");
        assert!(session.is_anonymous());
        assert!(!session.has_permission("admin"));

        let admin = session.with_user(UserIdentity::new("u1").with_permission("admin"));
        assert!(admin.has_permission("admin"));
    }

    #[test]
    fn serializes_connections_as_list() {
        let session = Session::new("s1")
            .with_connection(ConnectionInfo::new("c1", "Local", "pg").connected(true));
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["id"], "s1");
        assert_eq!(json["connections"][0]["sessionId"], "s1");
        assert_eq!(json["connections"][0]["connected"], true);
        assert!(json["user"].is_null());
    }
}
