//! GraphQL HTTP handlers: GraphiQL on GET `/graphql`, execution on POST
//! `/graphql`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    async_graphql::{ErrorExtensionValues, ServerError, http::GraphiQLSource},
    async_graphql_axum::{GraphQLRequest, GraphQLResponse},
    axum::{
        Json,
        extract::{ConnectInfo, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{Html, IntoResponse, Response},
    },
    modgraph_sessions::RequestInfo,
    tokio::time::Instant,
    tracing::{Instrument, debug, info_span, warn},
};

use crate::state::GatewayState;

/// Header carrying the caller's request id, echoed on the response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Execute a query or mutation with the caller's request attached.
pub async fn graphql_handler(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> Response {
    let timeout = state.config.graphql.request_timeout();
    let info = request_info(headers, addr, timeout);
    let request_id = info.request_id.clone();

    let request = req.into_inner().data(info);
    let span = info_span!("graphql", request_id = %request_id, remote = %addr);
    let response = match tokio::time::timeout(timeout, state.schema.execute(request))
        .instrument(span)
        .await
    {
        Ok(response) => {
            debug!(
                request_id = %request_id,
                errors = response.errors.len(),
                "graphql request done"
            );
            response
        },
        Err(_) => {
            warn!(
                request_id = %request_id,
                timeout_ms = timeout.as_millis() as u64,
                "graphql request deadline exceeded"
            );
            deadline_exceeded()
        },
    };

    let mut http = GraphQLResponse::from(response).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        http.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    http
}

/// Snapshot of the inbound request, keeping the caller's request id if sent.
/// A timeout too large to represent leaves the request without a deadline.
fn request_info(headers: HeaderMap, addr: SocketAddr, timeout: Duration) -> RequestInfo {
    let incoming_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from);

    let mut info = RequestInfo::new(headers).with_remote_addr(addr);
    if let Some(deadline) = Instant::now().checked_add(timeout) {
        info = info.with_deadline(deadline);
    }
    if let Some(id) = incoming_id {
        info = info.with_request_id(id);
    }
    info
}

fn deadline_exceeded() -> async_graphql::Response {
    let mut error = ServerError::new("request deadline exceeded", None);
    let mut extensions = ErrorExtensionValues::default();
    extensions.set("code", "DEADLINE_EXCEEDED");
    error.extensions = Some(extensions);
    async_graphql::Response::from_errors(vec![error])
}

/// GraphiQL, unless disabled in config.
pub async fn graphql_get_handler(State(state): State<Arc<GatewayState>>) -> Response {
    if !state.config.graphql.graphiql {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "graphiql is disabled" })),
        )
            .into_response();
    }
    Html(GraphiQLSource::build().endpoint("/graphql").finish()).into_response()
}
