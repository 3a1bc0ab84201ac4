//! Built-in interception checks.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    serde::Serialize,
    serde_json::Value,
    tracing::info,
};

use crate::{Check, Invocation, ServiceError, ServiceResult};

// ── Authentication ──────────────────────────────────────────────────────────

/// Denies calls that carry no authenticated user.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequireAuthenticated;

impl Check for RequireAuthenticated {
    fn name(&self) -> &str {
        "require-authenticated"
    }

    fn check(&self, invocation: &Invocation<'_>) -> ServiceResult<()> {
        match invocation.context.session.as_deref() {
            Some(session) if !session.is_anonymous() => Ok(()),
            Some(_) => Err(ServiceError::permission_denied(
                invocation,
                "anonymous sessions are not allowed",
            )),
            None => Err(ServiceError::permission_denied(
                invocation,
                "no session",
            )),
        }
    }
}

// ── Permissions ─────────────────────────────────────────────────────────────

/// Permissions required per operation, with a fallback for operations that
/// are not listed.
#[derive(Debug, Clone, Default)]
pub struct PermissionPolicy {
    default: Vec<String>,
    operations: HashMap<String, Vec<String>>,
}

impl PermissionPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Permissions required by operations without their own entry.
    #[must_use]
    pub fn require_by_default<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Permissions required by `operation`. Replaces the default for it.
    #[must_use]
    pub fn require<I, S>(mut self, operation: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operations.insert(
            operation.into(),
            permissions.into_iter().map(Into::into).collect(),
        );
        self
    }

    #[must_use]
    pub fn required_for(&self, operation: &str) -> &[String] {
        self.operations
            .get(operation)
            .unwrap_or(&self.default)
            .as_slice()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.operations.values().all(Vec::is_empty)
    }
}

/// Denies calls whose session user lacks a permission the policy requires.
#[derive(Debug, Clone)]
pub struct PermissionCheck {
    policy: PermissionPolicy,
}

impl PermissionCheck {
    #[must_use]
    pub fn new(policy: PermissionPolicy) -> Self {
        Self { policy }
    }
}

impl Check for PermissionCheck {
    fn name(&self) -> &str {
        "permissions"
    }

    fn check(&self, invocation: &Invocation<'_>) -> ServiceResult<()> {
        let required = self.policy.required_for(invocation.operation);
        if required.is_empty() {
            return Ok(());
        }

        let Some(session) = invocation.context.session.as_deref() else {
            return Err(ServiceError::permission_denied(invocation, "no session"));
        };
        match required.iter().find(|p| !session.has_permission(p)) {
            Some(missing) => Err(ServiceError::permission_denied(
                invocation,
                format!("missing permission '{missing}'"),
            )),
            None => Ok(()),
        }
    }
}

// ── Rate limiting ───────────────────────────────────────────────────────────

const CLEANUP_EVERY_CALLS: u64 = 512;

#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max_calls: usize,
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_calls: 600,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started_at: Instant,
    count: usize,
}

/// Fixed-window call limit per caller (session, else remote IP) and
/// capability.
pub struct RateLimitCheck {
    limit: RateLimit,
    buckets: DashMap<String, WindowState>,
    calls_seen: AtomicU64,
}

impl RateLimitCheck {
    #[must_use]
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            buckets: DashMap::new(),
            calls_seen: AtomicU64::new(0),
        }
    }

    fn check_at(&self, invocation: &Invocation<'_>, now: Instant) -> ServiceResult<()> {
        let limit = self.limit;
        let denied = |retry_after: Duration| ServiceError::RateLimited {
            capability: invocation.capability.to_string(),
            retry_after_ms: retry_after.as_millis() as u64,
        };
        if limit.max_calls == 0 {
            return Err(denied(limit.window.max(Duration::from_secs(1))));
        }

        let key = format!(
            "{}:{}",
            invocation.capability,
            invocation.context.subject()
        );
        let decision = match self.buckets.entry(key) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                let elapsed = now.duration_since(state.started_at);
                if elapsed >= limit.window {
                    state.started_at = now;
                    state.count = 1;
                    Ok(())
                } else if state.count < limit.max_calls {
                    state.count += 1;
                    Ok(())
                } else {
                    Err(denied(limit.window.saturating_sub(elapsed)))
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(WindowState {
                    started_at: now,
                    count: 1,
                });
                Ok(())
            },
        };

        self.cleanup_if_needed(now);
        decision
    }

    fn cleanup_if_needed(&self, now: Instant) {
        let seen = self.calls_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if !seen.is_multiple_of(CLEANUP_EVERY_CALLS) {
            return;
        }
        let stale_after = self.limit.window.saturating_mul(3);
        self.buckets
            .retain(|_, state| now.duration_since(state.started_at) <= stale_after);
    }
}

impl Check for RateLimitCheck {
    fn name(&self) -> &str {
        "rate-limit"
    }

    fn check(&self, invocation: &Invocation<'_>) -> ServiceResult<()> {
        self.check_at(invocation, Instant::now())
    }
}

// ── Audit ───────────────────────────────────────────────────────────────────

/// One audited invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub capability: String,
    pub operation: String,
    pub args: Value,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub at_ms: u64,
}

impl AuditRecord {
    fn from_invocation(invocation: &Invocation<'_>) -> Self {
        let context = invocation.context;
        Self {
            capability: invocation.capability.to_string(),
            operation: invocation.operation.to_string(),
            args: invocation.args.clone(),
            session_id: context.session_id().map(String::from),
            user_id: context.user_id().map(String::from),
            request_id: context.request_id.clone(),
            at_ms: modgraph_sessions::now_ms(),
        }
    }
}

/// Thread-safe destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Writes audit records as `info` events on the `modgraph::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            target: "modgraph::audit",
            capability = %record.capability,
            operation = %record.operation,
            session_id = record.session_id.as_deref().unwrap_or("-"),
            user_id = record.user_id.as_deref().unwrap_or("-"),
            request_id = record.request_id.as_deref().unwrap_or("-"),
            args = %record.args,
            "audit"
        );
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}

/// Records every invocation to a sink. Never denies.
pub struct AuditCheck {
    sink: Arc<dyn AuditSink>,
}

impl AuditCheck {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

impl Check for AuditCheck {
    fn name(&self) -> &str {
        "audit"
    }

    fn check(&self, invocation: &Invocation<'_>) -> ServiceResult<()> {
        self.sink.record(AuditRecord::from_invocation(invocation));
        Ok(())
    }
}

// ── Closures ────────────────────────────────────────────────────────────────

/// A check backed by a closure.
pub struct FnCheck<F> {
    name: String,
    f: F,
}

impl<F> FnCheck<F>
where
    F: Fn(&Invocation<'_>) -> ServiceResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Check for FnCheck<F>
where
    F: Fn(&Invocation<'_>) -> ServiceResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, invocation: &Invocation<'_>) -> ServiceResult<()> {
        (self.f)(invocation)
    }
}
