//! Invocation records, checks, and the interceptor that runs them.

use std::{future::Future, sync::Arc};

use {
    serde::Serialize,
    serde_json::Value,
    tracing::{Instrument, debug, debug_span, warn},
};

use crate::{CallContext, ServiceResult};

/// One in-flight call, as seen by checks.
///
/// Lives only for a single interception pass and is never stored.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub capability: &'static str,
    pub operation: &'static str,
    /// Call arguments keyed by parameter name.
    pub args: &'a Value,
    pub context: &'a CallContext,
}

impl Invocation<'_> {
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }
}

/// A cross-cutting rule evaluated before every intercepted call.
///
/// Checks decide from the invocation and its context alone. Any state they
/// keep (counters, audit output) is their own and must be thread-safe.
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(())` lets the call proceed; an error denies it and is returned to
    /// the caller as-is.
    fn check(&self, invocation: &Invocation<'_>) -> ServiceResult<()>;
}

/// Runs an ordered list of checks in front of one capability.
///
/// Holds no per-call state: cloning is cheap and one instance may serve any
/// number of concurrent calls.
#[derive(Clone)]
pub struct Interceptor {
    capability: &'static str,
    checks: Arc<[Arc<dyn Check>]>,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("capability", &self.capability)
            .field(
                "checks",
                &self.checks.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Interceptor {
    pub fn new(capability: &'static str, checks: impl IntoIterator<Item = Arc<dyn Check>>) -> Self {
        Self {
            capability,
            checks: checks.into_iter().collect(),
        }
    }

    /// Interceptor with no checks; every call is forwarded.
    #[must_use]
    pub fn passthrough(capability: &'static str) -> Self {
        Self::new(capability, [])
    }

    #[must_use]
    pub fn capability(&self) -> &'static str {
        self.capability
    }

    #[must_use]
    pub fn checks(&self) -> &[Arc<dyn Check>] {
        &self.checks
    }

    /// Run the checks in order, stopping at the first denial.
    pub fn authorize(&self, invocation: &Invocation<'_>) -> ServiceResult<()> {
        for check in self.checks.iter() {
            if let Err(denied) = check.check(invocation) {
                warn!(
                    capability = invocation.capability,
                    operation = invocation.operation,
                    check = check.name(),
                    subject = %invocation.context.subject(),
                    error = %denied,
                    "invocation denied"
                );
                return Err(denied);
            }
        }
        Ok(())
    }

    /// Authorize `operation` and, if allowed, run `call`.
    ///
    /// `call` is only invoked after every check passed. Its result, success
    /// or failure, is returned unmodified.
    pub async fn invoke<T, F, Fut>(
        &self,
        context: &CallContext,
        operation: &'static str,
        args: Value,
        call: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let invocation = Invocation {
            capability: self.capability,
            operation,
            args: &args,
            context,
        };
        self.authorize(&invocation)?;

        let span = debug_span!(
            "invoke",
            capability = self.capability,
            operation,
            request_id = context.request_id.as_deref().unwrap_or_default(),
        );
        let result = call().instrument(span).await;
        if let Err(e) = &result {
            debug!(
                capability = self.capability,
                operation,
                code = e.code(),
                error = %e,
                "call returned an error"
            );
        }
        result
    }
}

/// A capability interface that can be wrapped by an [`Interceptor`].
///
/// Implemented for `dyn Trait` by [`intercepted_service!`](crate::intercepted_service).
pub trait Capability: Send + Sync + 'static {
    /// Capability name used in invocation records and logs.
    const NAME: &'static str;

    /// Operation names, as they appear in invocation records.
    const OPERATIONS: &'static [&'static str];

    /// Wrap `inner` so every call goes through `interceptor` with `context`.
    fn intercept(inner: Arc<Self>, interceptor: Interceptor, context: CallContext) -> Arc<Self>;
}

/// Render one call argument for the invocation record.
///
/// An argument that fails to serialize is recorded as `null`.
pub fn arg_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(error = %e, "call argument could not be recorded");
        Value::Null
    })
}
