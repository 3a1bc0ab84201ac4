use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::get,
    },
    modgraph_config::ModgraphConfig,
    modgraph_graphql::{ModuleSet, build_schema},
    modgraph_sessions::MemorySessionStore,
    tokio::net::TcpListener,
    tower_http::cors::{Any, CorsLayer},
    tracing::{debug, info},
};

use crate::{
    graphql_routes::{graphql_get_handler, graphql_handler},
    modules::enabled_modules,
    state::GatewayState,
};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/graphql", get(graphql_get_handler).post(graphql_handler))
        .layer(cors)
        .with_state(state)
}

/// Compose `modules` into an executable schema and wrap it in gateway state.
///
/// Fails on any composition or resolver error, naming the offending module
/// or schema resource.
pub fn prepare_gateway(
    config: ModgraphConfig,
    sessions: Arc<MemorySessionStore>,
    modules: ModuleSet,
) -> anyhow::Result<Arc<GatewayState>> {
    let modules = enabled_modules(&config, modules);
    let schema = build_schema(&modules).context("failed to build the GraphQL schema")?;
    let names = modules.names().into_iter().map(String::from).collect();
    Ok(GatewayState::new(schema, config, sessions, names))
}

/// Serve `state` on an already-bound listener until it fails.
pub async fn serve(listener: TcpListener, state: Arc<GatewayState>) -> anyhow::Result<()> {
    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!(purged, "purged expired sessions");
            }
        }
    });

    let app = build_gateway_app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Start the gateway HTTP server.
///
/// The schema is composed before the listener is bound, so a broken module
/// never serves a partial schema.
pub async fn start_gateway(
    config: ModgraphConfig,
    sessions: Arc<MemorySessionStore>,
    modules: ModuleSet,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let state = prepare_gateway(config, sessions, modules)?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        addr = %listener.local_addr()?,
        modules = ?state.modules,
        version = %state.version,
        "gateway listening"
    );
    serve(listener, state).await
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "modules": state.modules,
        "sessions": state.sessions.len(),
        "uptimeMs": state.uptime_ms(),
    }))
}
