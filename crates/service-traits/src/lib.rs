//! Interception layer for service module capabilities.
//!
//! Every module implements its capability as an async trait. Resolver code
//! never calls that implementation directly: it asks the module binding for a
//! dispatch target, which is a decorator generated by
//! [`intercepted_service!`] that implements the same trait and runs the
//! configured [`Check`]s before forwarding each call.

pub mod checks;
pub mod context;
pub mod error;
pub mod interceptor;
mod macros;

pub use {
    checks::{
        AuditCheck, AuditRecord, AuditSink, FnCheck, MemoryAuditSink, PermissionCheck,
        PermissionPolicy, RateLimit, RateLimitCheck, RequireAuthenticated, TracingAuditSink,
    },
    context::CallContext,
    error::{ServiceError, ServiceResult},
    interceptor::{Capability, Check, Interceptor, Invocation, arg_value},
};

#[doc(hidden)]
pub mod __private {
    pub use {async_trait::async_trait, serde_json};
}
