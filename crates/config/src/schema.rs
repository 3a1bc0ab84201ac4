//! Config schema types.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModgraphConfig {
    pub server: ServerConfig,
    pub graphql: GraphqlConfig,
    pub sessions: SessionsConfig,
    /// Default call rate limit applied to every module.
    pub throttle: ThrottleConfig,
    /// Per-module interception policy, keyed by module name.
    pub modules: BTreeMap<String, ModuleConfig>,
}

impl ModgraphConfig {
    /// Policy for `module`, or the defaults when it has no section.
    #[must_use]
    pub fn module(&self, module: &str) -> ModuleConfig {
        self.modules.get(module).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphqlConfig {
    /// Serve GraphiQL on `GET /graphql`.
    pub graphiql: bool,
    /// Per-request deadline, also bounding session lookups.
    pub request_timeout_secs: u64,
    /// Directory whose schema files take precedence over the compiled-in
    /// ones, looked up by the same relative locator.
    pub schema_dir: Option<PathBuf>,
}

impl Default for GraphqlConfig {
    fn default() -> Self {
        Self {
            graphiql: true,
            request_timeout_secs: 30,
            schema_dir: None,
        }
    }
}

impl GraphqlConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub cookie_name: String,
    pub header_name: String,
    /// Lifetime of newly created sessions. `None` means no expiry.
    pub ttl_secs: Option<u64>,
    pub lookup_timeout_ms: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            cookie_name: "modgraph_session".into(),
            header_name: "x-session-id".into(),
            ttl_secs: Some(24 * 60 * 60),
            lookup_timeout_ms: 5_000,
        }
    }
}

impl SessionsConfig {
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub enabled: bool,
    pub max_calls: usize,
    pub window_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_calls: 600,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_calls: usize,
    pub window_secs: u64,
}

/// Interception policy for one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub enabled: bool,
    /// Deny calls without an authenticated session.
    pub require_session: bool,
    /// Permissions every operation requires.
    pub permissions: Vec<String>,
    /// Per-operation permissions, replacing `permissions` for that operation.
    pub operation_permissions: BTreeMap<String, Vec<String>>,
    /// Record every call to the audit log.
    pub audit: bool,
    /// Overrides the global `throttle` settings for this module.
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_session: false,
            permissions: Vec::new(),
            operation_permissions: BTreeMap::new(),
            audit: false,
            rate_limit: None,
        }
    }
}

impl ModuleConfig {
    /// Effective rate limit: the module override, else the global throttle
    /// when enabled.
    #[must_use]
    pub fn effective_rate_limit(&self, throttle: &ThrottleConfig) -> Option<RateLimitConfig> {
        self.rate_limit.or_else(|| {
            throttle.enabled.then_some(RateLimitConfig {
                max_calls: throttle.max_calls,
                window_secs: throttle.window_secs,
            })
        })
    }
}
