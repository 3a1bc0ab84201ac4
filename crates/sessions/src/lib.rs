//! Sessions, connection entities, and per-request context resolution.
//!
//! The session store itself is an external collaborator: this crate only
//! defines the [`SessionStore`] lookup seam plus an in-memory implementation.
//! [`ContextResolver`] turns an in-flight field resolution into the
//! originating request, its session, and (optionally) one of the session's
//! connections.

pub mod credential;
pub mod error;
pub mod resolver;
pub mod session;
pub mod store;

pub use {
    credential::{SessionCredential, bearer_token, parse_cookie},
    error::{Error, Result},
    resolver::{CONNECTION_ID_ARG, ContextResolver, FieldContext, RequestInfo, ResolverConfig},
    session::{ConnectionInfo, Session, UserIdentity, now_ms},
    store::{MemorySessionStore, SessionStore},
};
