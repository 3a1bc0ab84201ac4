use std::{sync::Arc, time::Instant};

use {
    modgraph_config::ModgraphConfig, modgraph_graphql::ModgraphSchema,
    modgraph_sessions::MemorySessionStore,
};

/// Shared state behind every route.
pub struct GatewayState {
    pub schema: ModgraphSchema,
    pub config: ModgraphConfig,
    pub sessions: Arc<MemorySessionStore>,
    /// Names of the modules composed into `schema`.
    pub modules: Vec<String>,
    pub version: String,
    started_at: Instant,
}

impl GatewayState {
    pub fn new(
        schema: ModgraphSchema,
        config: ModgraphConfig,
        sessions: Arc<MemorySessionStore>,
        modules: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            schema,
            config,
            sessions,
            modules,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        })
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}
