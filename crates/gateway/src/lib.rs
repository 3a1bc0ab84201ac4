//! HTTP surface for the modgraph schema.
//!
//! Serves queries and mutations on `POST /graphql`, GraphiQL on
//! `GET /graphql`, and a liveness check on `/health`. Every request carries
//! a [`RequestInfo`](modgraph_sessions::RequestInfo) into execution so field
//! resolvers can find the caller's session.

pub mod graphql_routes;
pub mod modules;
pub mod server;
pub mod state;

pub use {
    modules::{core_module, enabled_modules, module_checks, schema_source, session_runtime},
    server::{build_gateway_app, prepare_gateway, serve, start_gateway},
    state::GatewayState,
};
