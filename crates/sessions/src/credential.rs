//! Extracting the session credential from an inbound request.

use http::{HeaderMap, header};

/// Opaque token identifying a session in the [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionCredential(String);

impl SessionCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Find the value of cookie `name` in a `Cookie` header value.
///
/// Matches the full cookie name, so `sid` does not match `sid_legacy=...`.
pub fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extract the session credential: cookie first, then `header_name`, then
/// a bearer token.
pub(crate) fn extract(
    headers: &HeaderMap,
    cookie_name: &str,
    header_name: &str,
) -> Option<SessionCredential> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| parse_cookie(v, cookie_name))
        .filter(|v| !v.is_empty());
    if let Some(token) = from_cookie {
        return Some(SessionCredential::new(token));
    }

    let from_header = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(token) = from_header {
        return Some(SessionCredential::new(token));
    }

    bearer_token(headers).map(SessionCredential::new)
}
